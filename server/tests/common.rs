//! Common utilities for integration tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::Router;
use server::{build_router, config::ServerConfig, handler::InferenceHandler, AppState};
use tts_core::{AudioChunks, LocalFetcher, ModelFiles, ModelLoader, SampleFormat, StreamingModel};

/// Model that replays fixed chunks and remembers every prompt.
pub struct ScriptedModel {
    pub chunks: Vec<Vec<u8>>,
    pub fail_after: Option<usize>,
    pub format: SampleFormat,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            chunks,
            fail_after: None,
            format: SampleFormat::new(24_000, 2, 1),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl StreamingModel for ScriptedModel {
    fn predict(&self, text: &str) -> anyhow::Result<AudioChunks<'_>> {
        self.prompts.lock().unwrap().push(text.to_string());
        let fail_after = self.fail_after;
        Ok(Box::new(self.chunks.iter().enumerate().map(move |(i, chunk)| {
            match fail_after {
                Some(n) if i >= n => Err(anyhow::anyhow!("vocoder failure at chunk {i}")),
                _ => Ok(chunk.clone()),
            }
        })))
    }

    fn sample_format(&self) -> SampleFormat {
        self.format
    }
}

pub struct StaticLoader {
    pub model: Option<Arc<ScriptedModel>>,
}

impl ModelLoader for StaticLoader {
    fn load(&self, _files: &ModelFiles, _accelerated: bool) -> anyhow::Result<Arc<dyn StreamingModel>> {
        match &self.model {
            Some(model) => Ok(model.clone()),
            None => anyhow::bail!("checkpoint is unreadable"),
        }
    }
}

pub struct TestApp {
    pub router: Router,
    pub model: Arc<ScriptedModel>,
    _artifacts: tempfile::TempDir,
    _model_dir: tempfile::TempDir,
}

fn app_with_loader(model: Arc<ScriptedModel>, loader: StaticLoader) -> TestApp {
    let artifacts = tempfile::tempdir().unwrap();
    std::fs::write(artifacts.path().join("model.pth"), b"weights").unwrap();
    std::fs::write(artifacts.path().join("clipped_first_15_seconds.wav"), b"RIFF").unwrap();
    let model_dir = tempfile::tempdir().unwrap();

    let handler = Arc::new(InferenceHandler::new(
        model_dir.path(),
        Arc::new(LocalFetcher::new(artifacts.path())),
        Arc::new(loader),
    ));
    let router = build_router(AppState::new(handler, ServerConfig::default()));

    TestApp {
        router,
        model,
        _artifacts: artifacts,
        _model_dir: model_dir,
    }
}

/// Create a test app instance serving `model` as `xttsv2`.
pub fn create_test_app(model: ScriptedModel) -> TestApp {
    let model = Arc::new(model);
    let loader = StaticLoader {
        model: Some(model.clone()),
    };
    app_with_loader(model, loader)
}

/// A test app whose model never loads.
pub fn create_broken_app() -> TestApp {
    let model = Arc::new(ScriptedModel::new(Vec::new()));
    app_with_loader(model, StaticLoader { model: None })
}
