//! Concurrency sweep over a [`Probe`].

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::probe::{Probe, ProbeResult};

/// Averages for one concurrency level. Means cover successful probes only
/// and are NaN when none succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelSummary {
    pub level: usize,
    pub completed: usize,
    /// Seconds.
    pub mean_ttfc: f64,
    pub mean_rtf: f64,
}

pub fn summarize(level: usize, results: &[ProbeResult]) -> LevelSummary {
    let completed = results.len();
    if completed == 0 {
        return LevelSummary {
            level,
            completed,
            mean_ttfc: f64::NAN,
            mean_rtf: f64::NAN,
        };
    }

    let ttfc: f64 = results
        .iter()
        .map(|r| r.time_to_first_chunk.as_secs_f64())
        .sum();
    let rtf: f64 = results.iter().map(|r| r.real_time_factor).sum();

    LevelSummary {
        level,
        completed,
        mean_ttfc: ttfc / completed as f64,
        mean_rtf: rtf / completed as f64,
    }
}

/// Fire `level` probes at once and collect the successful ones in
/// completion order.
pub async fn run_level<P>(probe: &Arc<P>, text: &Arc<str>, level: usize) -> Vec<ProbeResult>
where
    P: Probe + ?Sized + 'static,
{
    let mut tasks = JoinSet::new();
    for _ in 0..level {
        let probe = probe.clone();
        let text = text.clone();
        tasks.spawn(async move { probe.run(&text).await });
    }

    let mut results = Vec::with_capacity(level);
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Some(result)) => results.push(result),
            Ok(None) => {}
            Err(e) => warn!("Probe task failed: {}", e),
        }
    }
    results
}

/// Run levels 1 through `max_concurrency` in order.
pub async fn benchmark_concurrency<P>(
    probe: Arc<P>,
    text: &str,
    max_concurrency: usize,
) -> Vec<LevelSummary>
where
    P: Probe + ?Sized + 'static,
{
    let text: Arc<str> = Arc::from(text);
    let mut summaries = Vec::with_capacity(max_concurrency);

    for level in 1..=max_concurrency {
        let results = run_level(&probe, &text, level).await;
        let summary = summarize(level, &results);
        info!(
            "Concurrency Level: {}, Average TTFC: {:.4} s, Average RTF: {:.4}",
            summary.level, summary.mean_ttfc, summary.mean_rtf
        );
        summaries.push(summary);
    }

    summaries
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tts_core::SampleFormat;

    fn result(ttfc_ms: u64, rtf: f64) -> ProbeResult {
        ProbeResult {
            time_to_first_chunk: Duration::from_millis(ttfc_ms),
            total_time: Duration::from_millis(ttfc_ms * 2),
            real_time_factor: rtf,
            audio: vec![0; 4],
            format: SampleFormat::default(),
        }
    }

    #[test]
    fn test_summarize_means() {
        let summary = summarize(2, &[result(100, 0.5), result(300, 1.5)]);
        assert_eq!(summary.completed, 2);
        assert!((summary.mean_ttfc - 0.2).abs() < 1e-9);
        assert!((summary.mean_rtf - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_summarize_empty_is_nan() {
        let summary = summarize(4, &[]);
        assert_eq!(summary.level, 4);
        assert_eq!(summary.completed, 0);
        assert!(summary.mean_ttfc.is_nan());
        assert!(summary.mean_rtf.is_nan());
    }

    #[test]
    fn test_infinite_rtf_propagates() {
        let summary = summarize(2, &[result(100, f64::INFINITY), result(100, 1.0)]);
        assert!(summary.mean_rtf.is_infinite());
    }
}
