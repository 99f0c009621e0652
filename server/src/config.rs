// Configuration for the inference server

use std::path::PathBuf;
use std::time::Duration;

use tts_core::{DEFAULT_MODEL_PATH, MODEL_PATH_ENV};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Name served under `/predictions/{model_name}`.
    pub model_name: String,
    /// Directory that holds (or will hold) the checkpoint directory.
    pub model_dir: PathBuf,
    /// Remote artifact location (`MODEL_PATH`).
    pub model_path: String,
    pub request_timeout_secs: u64,
    /// Load the model before accepting requests instead of on first use.
    pub preload_model: bool,
    pub cors_allowed_origins: Option<Vec<String>>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            model_name: "xttsv2".to_string(),
            model_dir: PathBuf::from("model_store"),
            model_path: DEFAULT_MODEL_PATH.to_string(),
            request_timeout_secs: 300,
            preload_model: true,
            cors_allowed_origins: None,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.port);

        let model_name = std::env::var("MODEL_NAME")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.model_name);

        let model_dir = std::env::var("MODEL_DIR")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.model_dir);

        let model_path = std::env::var(MODEL_PATH_ENV).unwrap_or(defaults.model_path);

        let request_timeout_secs = std::env::var("REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.request_timeout_secs);

        let preload_model = std::env::var("PRELOAD_MODEL")
            .ok()
            .map(|v| parse_flag(&v))
            .unwrap_or(defaults.preload_model);

        let cors_allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS")
            .ok()
            .map(|origins| {
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            });

        Self {
            port,
            model_name,
            model_dir,
            model_path,
            request_timeout_secs,
            preload_model,
            cors_allowed_origins,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_flag(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}
