//! Single streaming request against the inference endpoint.
//!
//! The probe measures time to first chunk and the real-time factor of one
//! synthesis. A stream that is cut off mid-body still counts: whatever
//! audio arrived before the interruption is treated as the full result.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{header::HeaderMap, Client, StatusCode};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};
use tts_core::format::{CHANNELS_HEADER, SAMPLE_RATE_HEADER, SAMPLE_WIDTH_HEADER};
use tts_core::SampleFormat;

#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub time_to_first_chunk: Duration,
    pub total_time: Duration,
    pub real_time_factor: f64,
    pub audio: Vec<u8>,
    /// Format the audio bytes were interpreted with.
    pub format: SampleFormat,
}

impl ProbeResult {
    pub fn audio_duration_secs(&self) -> f64 {
        self.format.duration_secs(self.audio.len())
    }
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Failed to stream. Status code: {status}. Error detail: {detail}")]
    Status { status: u16, detail: String },

    #[error("No audio data received.")]
    Empty,

    #[error("An error occurred during streaming synthesis: {0}")]
    Transport(#[from] reqwest::Error),
}

/// One measurement. Failures are logged and reported as `None` so a
/// benchmark level can average over whatever succeeded.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn run(&self, text: &str) -> Option<ProbeResult>;
}

pub struct HttpProbe {
    client: Client,
    url: String,
    format: SampleFormat,
    timeout: Option<Duration>,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>, format: SampleFormat) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
            format,
            timeout: None,
        }
    }

    /// Bound the whole exchange, body included.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub async fn stream_synthesize(&self, text: &str) -> Result<ProbeResult, ProbeError> {
        self.stream_synthesize_with(text, |_| {}).await
    }

    /// Like [`HttpProbe::stream_synthesize`], calling `on_first_chunk` with
    /// the time to first chunk as soon as that chunk arrives.
    pub async fn stream_synthesize_with<F>(
        &self,
        text: &str,
        on_first_chunk: F,
    ) -> Result<ProbeResult, ProbeError>
    where
        F: FnOnce(Duration) + Send,
    {
        let started = Instant::now();

        let mut request = self.client.post(&self.url).json(&json!({ "data": text }));
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }
        let response = request.send().await?;

        let status = response.status();
        if status != StatusCode::OK {
            let detail = response.text().await.unwrap_or_default();
            return Err(ProbeError::Status {
                status: status.as_u16(),
                detail,
            });
        }

        let format = advertised_format(response.headers()).unwrap_or(self.format);

        let mut stream = response.bytes_stream();
        let mut audio = Vec::new();
        let mut first_chunk = None;
        let mut on_first_chunk = Some(on_first_chunk);
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(bytes) if bytes.is_empty() => continue,
                Ok(bytes) => {
                    if first_chunk.is_none() {
                        let ttfc = started.elapsed();
                        first_chunk = Some(ttfc);
                        if let Some(report) = on_first_chunk.take() {
                            report(ttfc);
                        }
                    }
                    audio.extend_from_slice(&bytes);
                }
                // The server dropped the connection mid-body.
                Err(e) if (e.is_body() || e.is_decode()) && !e.is_timeout() => {
                    warn!("Stream interrupted after {} bytes: {}", audio.len(), e);
                    break;
                }
                Err(e) => return Err(e.into()),
            }
        }
        let total_time = started.elapsed();

        let time_to_first_chunk = match first_chunk {
            Some(ttfc) if !audio.is_empty() => ttfc,
            _ => return Err(ProbeError::Empty),
        };

        Ok(ProbeResult {
            time_to_first_chunk,
            total_time,
            real_time_factor: format.real_time_factor(total_time, audio.len()),
            audio,
            format,
        })
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn run(&self, text: &str) -> Option<ProbeResult> {
        match self.stream_synthesize(text).await {
            Ok(result) => Some(result),
            Err(e) => {
                error!("{}", e);
                None
            }
        }
    }
}

fn advertised_format(headers: &HeaderMap) -> Option<SampleFormat> {
    let value = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    SampleFormat::from_header_values(
        value(SAMPLE_RATE_HEADER),
        value(SAMPLE_WIDTH_HEADER),
        value(CHANNELS_HEADER),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_advertised_format_requires_all_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(SAMPLE_RATE_HEADER, HeaderValue::from_static("24000"));
        headers.insert(SAMPLE_WIDTH_HEADER, HeaderValue::from_static("2"));
        assert_eq!(advertised_format(&headers), None);

        headers.insert(CHANNELS_HEADER, HeaderValue::from_static("1"));
        assert_eq!(advertised_format(&headers), Some(SampleFormat::new(24_000, 2, 1)));
    }

    #[test]
    fn test_status_error_message() {
        let err = ProbeError::Status {
            status: 503,
            detail: "model not ready".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to stream. Status code: 503. Error detail: model not ready"
        );
    }
}
