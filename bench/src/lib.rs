pub mod benchmark;
pub mod config;
pub mod probe;
pub mod report;

pub use benchmark::{benchmark_concurrency, run_level, summarize, LevelSummary};
pub use config::{BenchConfig, SynthConfig};
pub use probe::{HttpProbe, Probe, ProbeError, ProbeResult};
pub use report::{render_plot, write_csv};

/// Install the `RUST_LOG` driven subscriber used by both binaries.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}
