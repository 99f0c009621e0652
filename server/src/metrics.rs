// Streaming metrics collection and tracking

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Number of time-to-first-chunk samples kept for percentiles.
const MAX_LATENCY_SAMPLES: usize = 1000;

/// Counters for the prediction endpoint.
#[derive(Debug, Clone)]
pub struct StreamMetrics {
    pub request_count: Arc<AtomicU64>,
    pub completed_count: Arc<AtomicU64>,
    pub error_count: Arc<AtomicU64>,
    pub chunks_sent: Arc<AtomicU64>,
    pub bytes_sent: Arc<AtomicU64>,
    pub first_chunk_count: Arc<AtomicU64>,
    pub total_ttfc_ms: Arc<AtomicU64>,
    // Last MAX_LATENCY_SAMPLES values, for percentiles
    pub ttfc_samples: Arc<Mutex<Vec<u64>>>,
    started_at: DateTime<Utc>,
    started: Instant,
}

impl StreamMetrics {
    pub fn new() -> Self {
        Self {
            request_count: Arc::new(AtomicU64::new(0)),
            completed_count: Arc::new(AtomicU64::new(0)),
            error_count: Arc::new(AtomicU64::new(0)),
            chunks_sent: Arc::new(AtomicU64::new(0)),
            bytes_sent: Arc::new(AtomicU64::new(0)),
            first_chunk_count: Arc::new(AtomicU64::new(0)),
            total_ttfc_ms: Arc::new(AtomicU64::new(0)),
            ttfc_samples: Arc::new(Mutex::new(Vec::new())),
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    pub fn record_request(&self) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completed(&self) {
        self.completed_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_chunk(&self, bytes: usize) {
        self.chunks_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_first_chunk(&self, latency: Duration) {
        let latency_ms = latency.as_millis() as u64;
        self.first_chunk_count.fetch_add(1, Ordering::Relaxed);
        self.total_ttfc_ms.fetch_add(latency_ms, Ordering::Relaxed);

        if let Ok(mut samples) = self.ttfc_samples.lock() {
            samples.push(latency_ms);
            if samples.len() > MAX_LATENCY_SAMPLES {
                samples.remove(0);
            }
        }
    }

    pub fn avg_ttfc_ms(&self) -> f64 {
        let count = self.first_chunk_count.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        let total = self.total_ttfc_ms.load(Ordering::Relaxed);
        total as f64 / count as f64
    }

    fn percentile(&self, p: u8) -> u64 {
        if let Ok(samples) = self.ttfc_samples.lock() {
            if samples.is_empty() {
                return 0;
            }
            let mut sorted = samples.clone();
            sorted.sort_unstable();
            let index = (sorted.len() * p as usize / 100).min(sorted.len() - 1);
            sorted[index]
        } else {
            0
        }
    }

    pub fn snapshot(&self) -> MetricsResponse {
        MetricsResponse {
            timestamp: Utc::now(),
            started_at: self.started_at,
            uptime_seconds: self.started.elapsed().as_secs(),
            request_count: self.request_count.load(Ordering::Relaxed),
            completed_count: self.completed_count.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
            chunks_sent: self.chunks_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            ttfc: LatencyStats {
                avg_ms: self.avg_ttfc_ms(),
                p50_ms: self.percentile(50),
                p95_ms: self.percentile(95),
                p99_ms: self.percentile(99),
            },
        }
    }
}

impl Default for StreamMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub timestamp: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub request_count: u64,
    pub completed_count: u64,
    pub error_count: u64,
    pub chunks_sent: u64,
    pub bytes_sent: u64,
    pub ttfc: LatencyStats,
}

#[derive(Debug, Serialize)]
pub struct LatencyStats {
    pub avg_ms: f64,
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = StreamMetrics::new();
        metrics.record_request();
        metrics.record_request();
        metrics.record_chunk(100);
        metrics.record_chunk(50);
        metrics.record_completed();
        metrics.record_error();

        let snap = metrics.snapshot();
        assert_eq!(snap.request_count, 2);
        assert_eq!(snap.completed_count, 1);
        assert_eq!(snap.error_count, 1);
        assert_eq!(snap.chunks_sent, 2);
        assert_eq!(snap.bytes_sent, 150);
    }

    #[test]
    fn test_ttfc_percentiles() {
        let metrics = StreamMetrics::new();
        for ms in 1..=100 {
            metrics.record_first_chunk(Duration::from_millis(ms));
        }

        let snap = metrics.snapshot();
        assert_eq!(snap.ttfc.p50_ms, 51);
        assert_eq!(snap.ttfc.p99_ms, 100);
        assert!((snap.ttfc.avg_ms - 50.5).abs() < 1e-9);
    }

    #[test]
    fn test_empty_snapshot() {
        let snap = StreamMetrics::new().snapshot();
        assert_eq!(snap.ttfc.avg_ms, 0.0);
        assert_eq!(snap.ttfc.p95_ms, 0);
    }
}
