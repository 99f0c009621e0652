//! The speech model seen as an opaque capability: text in, a lazy sequence
//! of audio byte chunks out.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::format::SampleFormat;

/// Weights file expected inside the checkpoint directory.
pub const MODEL_WEIGHTS: &str = "model.pth";
/// Speaker reference clip expected inside the checkpoint directory.
pub const SPEAKER_REFERENCE: &str = "clipped_first_15_seconds.wav";

/// Lazy, finite, non-restartable sequence of PCM chunks.
pub type AudioChunks<'a> = Box<dyn Iterator<Item = anyhow::Result<Vec<u8>>> + 'a>;

pub trait StreamingModel: Send + Sync {
    /// Start synthesizing `text`. Chunks are produced on demand as the
    /// iterator is advanced; an `Err` item ends the stream.
    fn predict(&self, text: &str) -> anyhow::Result<AudioChunks<'_>>;

    /// Format of the PCM bytes produced by `predict`.
    fn sample_format(&self) -> SampleFormat {
        SampleFormat::default()
    }
}

/// Files a model is bound to inside a checkpoint directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFiles {
    pub checkpoint_dir: PathBuf,
    pub weights: String,
    pub reference_audio: String,
}

impl ModelFiles {
    pub fn new<P: Into<PathBuf>>(checkpoint_dir: P) -> Self {
        Self {
            checkpoint_dir: checkpoint_dir.into(),
            weights: MODEL_WEIGHTS.to_string(),
            reference_audio: SPEAKER_REFERENCE.to_string(),
        }
    }

    pub fn weights_path(&self) -> PathBuf {
        self.checkpoint_dir.join(&self.weights)
    }

    pub fn reference_audio_path(&self) -> PathBuf {
        self.checkpoint_dir.join(&self.reference_audio)
    }

    /// Path of an arbitrary file inside the checkpoint directory.
    pub fn resolve<P: AsRef<Path>>(&self, name: P) -> PathBuf {
        self.checkpoint_dir.join(name)
    }
}

/// Builds a ready-to-serve model from a checkpoint directory.
pub trait ModelLoader: Send + Sync {
    fn load(&self, files: &ModelFiles, accelerated: bool) -> anyhow::Result<Arc<dyn StreamingModel>>;
}

/// Whether a CUDA-capable device is visible to this process.
/// `DISABLE_ACCELERATOR` forces CPU inference.
pub fn accelerator_available() -> bool {
    if std::env::var_os("DISABLE_ACCELERATOR").is_some() {
        return false;
    }
    Path::new("/dev/nvidia0").exists() || Path::new("/proc/driver/nvidia/version").exists()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Countdown;

    impl StreamingModel for Countdown {
        fn predict(&self, text: &str) -> anyhow::Result<AudioChunks<'_>> {
            let n = text.len() as u8;
            Ok(Box::new((0..n).rev().map(|i| Ok(vec![i]))))
        }
    }

    #[test]
    fn test_model_files_defaults() {
        let files = ModelFiles::new("/models/xtts_artifacts");
        assert_eq!(files.weights_path(), PathBuf::from("/models/xtts_artifacts/model.pth"));
        assert_eq!(
            files.reference_audio_path(),
            PathBuf::from("/models/xtts_artifacts/clipped_first_15_seconds.wav")
        );
    }

    #[test]
    fn test_predict_is_lazy_and_ordered() {
        let model = Countdown;
        let chunks: Vec<Vec<u8>> = model.predict("abc").unwrap().map(|c| c.unwrap()).collect();
        assert_eq!(chunks, vec![vec![2], vec![1], vec![0]]);
        assert_eq!(model.sample_format(), SampleFormat::default());
    }
}
