//! Raw PCM sample format shared by the server and the benchmark clients.
//!
//! The model streams headerless PCM, so every duration derived from a byte
//! count depends on this description. The server advertises the format of
//! the loaded model in response headers; clients fall back to their own
//! configured format when those headers are missing.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Response header carrying the sample rate in Hz.
pub const SAMPLE_RATE_HEADER: &str = "x-audio-sample-rate";
/// Response header carrying the sample width in bytes.
pub const SAMPLE_WIDTH_HEADER: &str = "x-audio-sample-width";
/// Response header carrying the channel count.
pub const CHANNELS_HEADER: &str = "x-audio-channels";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleFormat {
    pub sample_rate: u32,
    /// Bytes per sample (2 for 16-bit PCM).
    pub sample_width: u16,
    pub channels: u16,
}

impl Default for SampleFormat {
    fn default() -> Self {
        Self {
            sample_rate: 22_050,
            sample_width: 2,
            channels: 1,
        }
    }
}

impl SampleFormat {
    pub fn new(sample_rate: u32, sample_width: u16, channels: u16) -> Self {
        Self {
            sample_rate,
            sample_width,
            channels,
        }
    }

    /// Read `AUDIO_SAMPLE_RATE`, `AUDIO_SAMPLE_WIDTH` and `AUDIO_CHANNELS`,
    /// keeping the default for anything unset or unparsable.
    pub fn from_env() -> Self {
        let default = Self::default();

        let sample_rate = std::env::var("AUDIO_SAMPLE_RATE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default.sample_rate);

        let sample_width = std::env::var("AUDIO_SAMPLE_WIDTH")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default.sample_width);

        let channels = std::env::var("AUDIO_CHANNELS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default.channels);

        Self {
            sample_rate,
            sample_width,
            channels,
        }
    }

    /// Parse the three audio format header values. All of them must be
    /// present and numeric.
    pub fn from_header_values(
        sample_rate: Option<&str>,
        sample_width: Option<&str>,
        channels: Option<&str>,
    ) -> Option<Self> {
        Some(Self {
            sample_rate: sample_rate?.trim().parse().ok()?,
            sample_width: sample_width?.trim().parse().ok()?,
            channels: channels?.trim().parse().ok()?,
        })
    }

    /// Bytes per frame (one sample for every channel).
    pub fn frame_size(&self) -> usize {
        self.sample_width as usize * self.channels as usize
    }

    pub fn bytes_per_second(&self) -> u64 {
        self.sample_rate as u64 * self.frame_size() as u64
    }

    /// Audio duration in seconds represented by `byte_len` bytes of PCM.
    /// A degenerate format (zero rate, width or channels) yields 0.
    pub fn duration_secs(&self, byte_len: usize) -> f64 {
        let bps = self.bytes_per_second();
        if bps == 0 {
            return 0.0;
        }
        byte_len as f64 / bps as f64
    }

    /// Wall-clock processing time divided by the audio duration.
    /// Infinite when the duration computes to zero.
    pub fn real_time_factor(&self, processing: Duration, byte_len: usize) -> f64 {
        let audio_duration = self.duration_secs(byte_len);
        if audio_duration > 0.0 {
            processing.as_secs_f64() / audio_duration
        } else {
            f64::INFINITY
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_16bit_mono_22050() {
        let format = SampleFormat::default();
        assert_eq!(format.bytes_per_second(), 44_100);
        assert_eq!(format.frame_size(), 2);
    }

    #[test]
    fn test_duration_and_rtf() {
        let format = SampleFormat::default();
        // one second of audio
        assert!((format.duration_secs(44_100) - 1.0).abs() < 1e-12);

        let rtf = format.real_time_factor(Duration::from_millis(500), 44_100);
        assert!((rtf - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_rtf_infinite_for_zero_duration() {
        let format = SampleFormat::default();
        assert!(format.real_time_factor(Duration::from_secs(1), 0).is_infinite());

        let broken = SampleFormat::new(0, 2, 1);
        assert!(broken.real_time_factor(Duration::from_secs(1), 100).is_infinite());
    }

    #[test]
    fn test_from_header_values() {
        let parsed = SampleFormat::from_header_values(Some("24000"), Some("2"), Some(" 1 "));
        assert_eq!(parsed, Some(SampleFormat::new(24_000, 2, 1)));

        assert_eq!(SampleFormat::from_header_values(Some("24000"), None, Some("1")), None);
        assert_eq!(SampleFormat::from_header_values(Some("fast"), Some("2"), Some("1")), None);
    }
}
