//! Driver tests against deterministic stub probes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bench::{benchmark_concurrency, report, run_level, Probe, ProbeResult};
use tts_core::SampleFormat;

fn result(ttfc_ms: u64, rtf: f64) -> ProbeResult {
    ProbeResult {
        time_to_first_chunk: Duration::from_millis(ttfc_ms),
        total_time: Duration::from_millis(ttfc_ms + 100),
        real_time_factor: rtf,
        audio: vec![0; 64],
        format: SampleFormat::default(),
    }
}

/// Every other call fails; successful calls all report the same numbers.
struct FlakyProbe {
    calls: AtomicUsize,
}

#[async_trait]
impl Probe for FlakyProbe {
    async fn run(&self, _text: &str) -> Option<ProbeResult> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call % 2 == 1 {
            None
        } else {
            Some(result(200, 0.5))
        }
    }
}

struct DeadProbe;

#[async_trait]
impl Probe for DeadProbe {
    async fn run(&self, _text: &str) -> Option<ProbeResult> {
        None
    }
}

/// Tracks how many probes are in flight at once.
struct GaugeProbe {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

#[async_trait]
impl Probe for GaugeProbe {
    async fn run(&self, text: &str) -> Option<ProbeResult> {
        assert_eq!(text, "gauge");
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Some(result(10, 1.0))
    }
}

struct PanickingProbe;

#[async_trait]
impl Probe for PanickingProbe {
    async fn run(&self, _text: &str) -> Option<ProbeResult> {
        panic!("probe blew up");
    }
}

#[tokio::test]
async fn test_one_row_per_level_with_means_over_successes() {
    let probe = Arc::new(FlakyProbe {
        calls: AtomicUsize::new(0),
    });
    let summaries = benchmark_concurrency(probe.clone(), "Hello", 3).await;

    assert_eq!(summaries.len(), 3);
    assert_eq!(
        summaries.iter().map(|s| s.level).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert_eq!(probe.calls.load(Ordering::SeqCst), 6);

    for summary in &summaries {
        assert!(summary.completed >= 1);
        assert!(summary.completed <= summary.level);
        assert!((summary.mean_ttfc - 0.2).abs() < 1e-9);
        assert!((summary.mean_rtf - 0.5).abs() < 1e-9);
    }
    let completed: usize = summaries.iter().map(|s| s.completed).sum();
    assert_eq!(completed, 3);

    let csv = report::csv_string(&summaries);
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], "Concurrency Level,Average TTFC,Average RTF");
    assert!(lines[1].starts_with("1,"));
    assert!(lines[3].starts_with("3,"));
}

#[tokio::test]
async fn test_all_failures_yield_nan() {
    let summaries = benchmark_concurrency(Arc::new(DeadProbe), "Hello", 2).await;

    assert_eq!(summaries.len(), 2);
    for summary in &summaries {
        assert_eq!(summary.completed, 0);
        assert!(summary.mean_ttfc.is_nan());
        assert!(summary.mean_rtf.is_nan());
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("perf.csv");
    report::write_csv(&path, &summaries).unwrap();
    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.contains("1,nan,nan"));
    assert!(contents.contains("2,nan,nan"));
}

#[tokio::test]
async fn test_zero_max_concurrency_runs_nothing() {
    let probe = Arc::new(FlakyProbe {
        calls: AtomicUsize::new(0),
    });
    let summaries = benchmark_concurrency(probe.clone(), "Hello", 0).await;
    assert!(summaries.is_empty());
    assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_level_runs_all_probes_at_once() {
    let probe = Arc::new(GaugeProbe {
        in_flight: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
        calls: AtomicUsize::new(0),
    });
    let text: Arc<str> = Arc::from("gauge");

    let results = run_level(&probe, &text, 4).await;

    assert_eq!(results.len(), 4);
    assert_eq!(probe.calls.load(Ordering::SeqCst), 4);
    // every probe of the level is in flight together
    assert_eq!(probe.peak.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_panicking_probe_is_discarded() {
    let summaries = benchmark_concurrency(Arc::new(PanickingProbe), "Hello", 2).await;
    assert_eq!(summaries.len(), 2);
    assert!(summaries.iter().all(|s| s.completed == 0));
}

#[tokio::test]
async fn test_trait_object_probe() {
    let probe: Arc<dyn Probe> = Arc::new(FlakyProbe {
        calls: AtomicUsize::new(0),
    });
    let summaries = benchmark_concurrency(probe, "Hello", 1).await;
    assert_eq!(summaries[0].completed, 1);
}

#[tokio::test]
async fn test_empty_level_spawns_nothing() {
    let probe = Arc::new(FlakyProbe {
        calls: AtomicUsize::new(0),
    });
    let text: Arc<str> = Arc::from("Hello");
    assert!(run_level(&probe, &text, 0).await.is_empty());
    assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
}
