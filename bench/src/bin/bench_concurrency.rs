use std::sync::Arc;

use bench::{benchmark_concurrency, render_plot, write_csv, BenchConfig, HttpProbe};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    bench::init_tracing();
    let _ = dotenv::dotenv();

    let config = BenchConfig::from_env();
    info!(
        "Benchmarking {} at concurrency 1..={}",
        config.url, config.max_concurrency
    );

    let probe = Arc::new(HttpProbe::new(config.url.clone(), config.format));
    let summaries = benchmark_concurrency(probe, &config.text, config.max_concurrency).await;

    render_plot(&config.plot_path, &summaries)?;
    write_csv(&config.csv_path, &summaries)?;
    info!(
        "Wrote {} and {}",
        config.plot_path.display(),
        config.csv_path.display()
    );
    Ok(())
}
