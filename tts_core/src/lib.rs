//! Shared building blocks for the streaming TTS server and its clients:
//! PCM sample formats, WAV wrapping, the streaming model abstraction and
//! model artifact provisioning.

pub mod artifacts;
pub mod format;
pub mod model;
#[cfg(feature = "piper")]
pub mod piper;
pub mod wav;

pub use artifacts::{
    ensure_checkpoint_dir, ArtifactFetcher, ArtifactSource, GcsFetcher, LocalFetcher,
    CHECKPOINT_SUBDIR, DEFAULT_MODEL_PATH, MODEL_PATH_ENV,
};
pub use format::SampleFormat;
pub use model::{
    accelerator_available, AudioChunks, ModelFiles, ModelLoader, StreamingModel, MODEL_WEIGHTS,
    SPEAKER_REFERENCE,
};
pub use wav::{pcm16_from_f32, write_pcm_wav};
