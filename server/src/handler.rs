//! The inference handler: lazy one-time model setup, request normalization,
//! and forwarding of the model's chunks as intermediate responses.

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Bytes;
use tokio::sync::OnceCell;
use tracing::{debug, info};
use tts_core::{
    accelerator_available, ensure_checkpoint_dir, ArtifactFetcher, AudioChunks, ModelFiles,
    ModelLoader, SampleFormat, StreamingModel,
};

use crate::error::HandlerError;
use crate::payload::{extract_text, InferenceRequest};

/// Status label attached to every streamed chunk.
pub const INTERMEDIATE_RESPONSE: &str = "Intermediate response";

/// Per-request metadata supplied by the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub model_name: String,
    pub request_ids: Vec<String>,
}

impl RequestContext {
    pub fn new(model_name: &str, request_id: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            request_ids: vec![request_id.to_string()],
        }
    }
}

/// A partial result delivered before the request completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntermediateResponse {
    pub request_ids: Vec<String>,
    pub message: &'static str,
    pub code: u16,
    pub body: Bytes,
}

/// Destination of intermediate responses. `send` may block; the next chunk
/// is not requested from the model until it returns.
pub trait IntermediateSink {
    fn send(&mut self, response: IntermediateResponse) -> Result<(), HandlerError>;
}

impl IntermediateSink for std::sync::mpsc::Sender<IntermediateResponse> {
    fn send(&mut self, response: IntermediateResponse) -> Result<(), HandlerError> {
        std::sync::mpsc::Sender::send(self, response).map_err(|_| HandlerError::Disconnected)
    }
}

pub struct InferenceHandler {
    model_dir: PathBuf,
    fetcher: Arc<dyn ArtifactFetcher>,
    loader: Arc<dyn ModelLoader>,
    model: OnceCell<Arc<dyn StreamingModel>>,
}

impl InferenceHandler {
    pub fn new<P: Into<PathBuf>>(
        model_dir: P,
        fetcher: Arc<dyn ArtifactFetcher>,
        loader: Arc<dyn ModelLoader>,
    ) -> Self {
        Self {
            model_dir: model_dir.into(),
            fetcher,
            loader,
            model: OnceCell::new(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.model.initialized()
    }

    /// Format of the loaded model's output, once initialized.
    pub fn sample_format(&self) -> Option<SampleFormat> {
        self.model.get().map(|model| model.sample_format())
    }

    /// Provision artifacts and load the model, at most once per handler.
    /// Concurrent callers wait for the same initialization; a failure
    /// leaves the handler uninitialized.
    pub async fn initialize(&self) -> Result<Arc<dyn StreamingModel>, HandlerError> {
        let model = self.model.get_or_try_init(|| self.load_model()).await?;
        Ok(model.clone())
    }

    async fn load_model(&self) -> Result<Arc<dyn StreamingModel>, HandlerError> {
        let checkpoint_dir = ensure_checkpoint_dir(&self.model_dir, self.fetcher.as_ref())
            .await
            .map_err(HandlerError::Initialization)?;

        let files = ModelFiles::new(checkpoint_dir);
        let accelerated = accelerator_available();
        info!(
            "Loading model from {} (accelerated: {})",
            files.checkpoint_dir.display(),
            accelerated
        );

        let loader = self.loader.clone();
        let model = tokio::task::spawn_blocking(move || loader.load(&files, accelerated))
            .await?
            .map_err(HandlerError::Initialization)?;

        info!("Model initialized...");
        Ok(model)
    }

    pub fn preprocess(&self, requests: &[InferenceRequest]) -> Result<String, HandlerError> {
        extract_text(requests)
    }

    /// Start the model on `text`. The returned chunks are produced lazily.
    pub fn inference<'m>(
        model: &'m dyn StreamingModel,
        text: &str,
    ) -> Result<AudioChunks<'m>, HandlerError> {
        model.predict(text).map_err(HandlerError::Inference)
    }

    /// Run one request end to end. Every chunk goes to `sink` as soon as the
    /// model yields it; the returned batch is always empty.
    pub async fn handle<S>(
        &self,
        requests: Vec<InferenceRequest>,
        context: RequestContext,
        sink: S,
    ) -> Result<Vec<Bytes>, HandlerError>
    where
        S: IntermediateSink + Send + 'static,
    {
        let model = self.initialize().await?;
        let text = self.preprocess(&requests)?;
        debug!(
            "Synthesizing {} chars for request {:?}",
            text.chars().count(),
            context.request_ids
        );

        let sent =
            tokio::task::spawn_blocking(move || stream_chunks(model.as_ref(), &text, &context, sink))
                .await??;

        debug!("Streamed {} chunk(s)", sent);
        Ok(Vec::new())
    }
}

fn stream_chunks<S: IntermediateSink>(
    model: &dyn StreamingModel,
    text: &str,
    context: &RequestContext,
    mut sink: S,
) -> Result<usize, HandlerError> {
    let mut sent = 0usize;
    for chunk in InferenceHandler::inference(model, text)? {
        let chunk = chunk.map_err(HandlerError::Inference)?;
        sink.send(IntermediateResponse {
            request_ids: context.request_ids.clone(),
            message: INTERMEDIATE_RESPONSE,
            code: 200,
            body: Bytes::from(chunk),
        })?;
        sent += 1;
    }
    Ok(sent)
}
