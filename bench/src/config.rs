// Configuration for the benchmark clients

use std::path::PathBuf;
use std::time::Duration;

use tts_core::SampleFormat;

pub const DEFAULT_URL: &str = "http://localhost:8000/predictions/xttsv2";
pub const DEFAULT_TEXT: &str = "Hello, this is a short sentence for streaming synthesis.";

#[derive(Debug, Clone)]
pub struct BenchConfig {
    pub url: String,
    pub text: String,
    /// Highest concurrency level; levels run from 1 up to this value.
    pub max_concurrency: usize,
    pub csv_path: PathBuf,
    pub plot_path: PathBuf,
    /// Fallback when the server does not advertise its audio format.
    pub format: SampleFormat,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            text: DEFAULT_TEXT.to_string(),
            max_concurrency: 20,
            csv_path: PathBuf::from("torchserve_perf.csv"),
            plot_path: PathBuf::from("benchmark_results_http.png"),
            format: SampleFormat::default(),
        }
    }
}

impl BenchConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let max_concurrency = std::env::var("BENCH_MAX_CONCURRENCY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_concurrency);

        Self {
            url: non_empty_var("BENCH_URL").unwrap_or(defaults.url),
            text: non_empty_var("BENCH_TEXT").unwrap_or(defaults.text),
            max_concurrency,
            csv_path: non_empty_var("BENCH_CSV_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.csv_path),
            plot_path: non_empty_var("BENCH_PLOT_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.plot_path),
            format: SampleFormat::from_env(),
        }
    }
}

/// Settings for the single-request client. Shares the endpoint and text
/// variables with the benchmark.
#[derive(Debug, Clone)]
pub struct SynthConfig {
    pub url: String,
    pub text: String,
    pub output: PathBuf,
    pub timeout: Duration,
    pub format: SampleFormat,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            text: DEFAULT_TEXT.to_string(),
            output: PathBuf::from("output_audio.wav"),
            timeout: Duration::from_secs(20),
            format: SampleFormat::default(),
        }
    }
}

impl SynthConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let timeout = std::env::var("SYNTH_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout);

        Self {
            url: non_empty_var("BENCH_URL").unwrap_or(defaults.url),
            text: non_empty_var("BENCH_TEXT").unwrap_or(defaults.text),
            output: non_empty_var("SYNTH_OUTPUT")
                .map(PathBuf::from)
                .unwrap_or(defaults.output),
            timeout,
            format: SampleFormat::from_env(),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
