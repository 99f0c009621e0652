//! Piper (ONNX) speech backend.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use piper_rs::synth::PiperSpeechSynthesizer;
use tracing::info;

use crate::format::SampleFormat;
use crate::model::{AudioChunks, ModelFiles, ModelLoader, StreamingModel};
use crate::wav::pcm16_from_f32;

/// Loads a Piper voice whose config sits in the checkpoint directory.
#[derive(Debug, Clone)]
pub struct PiperLoader {
    voice_config: String,
}

impl PiperLoader {
    pub fn new(voice_config: &str) -> Self {
        Self {
            voice_config: voice_config.to_string(),
        }
    }

    /// `PIPER_VOICE_CONFIG`, default `model.onnx.json`.
    pub fn from_env() -> Self {
        let voice_config =
            std::env::var("PIPER_VOICE_CONFIG").unwrap_or_else(|_| "model.onnx.json".to_string());
        Self::new(&voice_config)
    }
}

impl ModelLoader for PiperLoader {
    fn load(&self, files: &ModelFiles, accelerated: bool) -> anyhow::Result<Arc<dyn StreamingModel>> {
        let cfg_path = files.resolve(&self.voice_config);
        if accelerated {
            info!("Accelerator detected; Piper uses the ONNX runtime's default provider");
        }

        let sample_rate = read_sample_rate(&cfg_path)?;
        let model = piper_rs::from_config_path(&cfg_path)
            .map_err(|e| anyhow::anyhow!("piper load error: {e}"))?;
        let synth = PiperSpeechSynthesizer::new(model)?;

        info!("Loaded Piper voice {} ({} Hz)", cfg_path.display(), sample_rate);
        Ok(Arc::new(PiperModel {
            synth,
            format: SampleFormat::new(sample_rate, 2, 1),
        }))
    }
}

pub struct PiperModel {
    synth: PiperSpeechSynthesizer,
    format: SampleFormat,
}

impl StreamingModel for PiperModel {
    fn predict(&self, text: &str) -> anyhow::Result<AudioChunks<'_>> {
        let iter = self
            .synth
            .synthesize_parallel(text.to_string(), None)
            .map_err(|e| anyhow::anyhow!("piper synth error: {e}"))?;

        Ok(Box::new(iter.map(|part| {
            part.map(|samples| pcm16_from_f32(&samples.into_vec()))
                .map_err(|e| anyhow::anyhow!("chunk error: {e}"))
        })))
    }

    fn sample_format(&self) -> SampleFormat {
        self.format
    }
}

fn read_sample_rate(cfg_path: &Path) -> anyhow::Result<u32> {
    let text = std::fs::read_to_string(cfg_path)
        .with_context(|| format!("Failed to load {}", cfg_path.display()))?;
    let json: serde_json::Value =
        serde_json::from_str(&text).with_context(|| "voice config is not valid JSON")?;

    let sample_rate = json
        .get("audio")
        .and_then(|a| a.get("sample_rate"))
        .and_then(|sr| sr.as_u64())
        .ok_or_else(|| anyhow::anyhow!("Missing or invalid 'audio.sample_rate' in config"))?;

    Ok(sample_rate as u32)
}
