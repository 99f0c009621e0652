use anyhow::Context;
use bench::{HttpProbe, ProbeError, SynthConfig};
use tts_core::write_pcm_wav;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    bench::init_tracing();
    let _ = dotenv::dotenv();

    let config = SynthConfig::from_env();
    let probe = HttpProbe::new(config.url.clone(), config.format).with_timeout(config.timeout);

    let outcome = probe
        .stream_synthesize_with(&config.text, |ttfc| {
            println!(
                "Time to First Chunk (TTFC): {:.4} seconds",
                ttfc.as_secs_f64()
            );
        })
        .await;
    let result = match outcome {
        Ok(result) => result,
        Err(ProbeError::Status { status, .. }) => {
            println!("Request failed with status code {status}");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    println!(
        "Total Processing Time: {:.4} seconds",
        result.total_time.as_secs_f64()
    );
    println!("Audio Duration: {:.4} seconds", result.audio_duration_secs());
    println!("Real-Time Factor (RTF): {:.4}", result.real_time_factor);

    write_pcm_wav(&config.output, &result.audio, result.format)
        .with_context(|| format!("Failed to save {}", config.output.display()))?;
    println!(
        "Audio content has been processed and saved to {}",
        config.output.display()
    );
    Ok(())
}
