pub mod config;
pub mod error;
pub mod handler;
pub mod metrics;
pub mod payload;

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::{Body, Bytes},
    extract::{Path, Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use futures_util::{stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, warn};
use tts_core::format::{CHANNELS_HEADER, SAMPLE_RATE_HEADER, SAMPLE_WIDTH_HEADER};

use crate::config::ServerConfig;
use crate::error::{ApiError, HandlerError};
use crate::handler::{InferenceHandler, IntermediateResponse, IntermediateSink, RequestContext};
use crate::metrics::{MetricsResponse, StreamMetrics};
use crate::payload::InferenceRequest;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<InferenceHandler>,
    pub metrics: StreamMetrics,
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(handler: Arc<InferenceHandler>, config: ServerConfig) -> Self {
        Self {
            handler,
            metrics: StreamMetrics::new(),
            config,
        }
    }
}

/// Routes and the request-id middleware. Transport layers (tracing,
/// timeouts, CORS) are added by the binary.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ping", get(health_check))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_endpoint))
        .route("/predictions/{model_name}", post(predictions))
        .layer(middleware::from_fn(add_request_id))
        .with_state(state)
}

/// Keep the caller's request id or assign a fresh one, and echo it back.
pub async fn add_request_id(mut request: Request, next: Next) -> Response {
    let request_id = match request
        .headers()
        .get(REQUEST_ID_HEADER)
        .filter(|v| !v.is_empty() && v.to_str().is_ok())
    {
        Some(value) => value.clone(),
        None => HeaderValue::from_str(&uuid::Uuid::new_v4().to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("unknown")),
    };

    request
        .headers_mut()
        .insert(REQUEST_ID_HEADER, request_id.clone());
    let mut response = next.run(request).await;
    response.headers_mut().insert(REQUEST_ID_HEADER, request_id);
    response
}

pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn metrics_endpoint(State(state): State<AppState>) -> Json<MetricsResponse> {
    Json(state.metrics.snapshot())
}

enum Frame {
    Chunk(IntermediateResponse),
    Failed(HandlerError),
}

/// Hands chunks to the HTTP body. `blocking_send` on a capacity-1 channel
/// keeps the model from running ahead of the transport.
struct ChannelSink {
    tx: mpsc::Sender<Frame>,
    metrics: StreamMetrics,
}

impl IntermediateSink for ChannelSink {
    fn send(&mut self, response: IntermediateResponse) -> Result<(), HandlerError> {
        let len = response.body.len();
        self.tx
            .blocking_send(Frame::Chunk(response))
            .map_err(|_| HandlerError::Disconnected)?;
        self.metrics.record_chunk(len);
        Ok(())
    }
}

/// `POST /predictions/{model_name}`: stream synthesized audio as a chunked
/// body. Errors raised before the first chunk become JSON error responses;
/// later errors abort the body.
pub async fn predictions(
    State(state): State<AppState>,
    Path(model_name): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    if model_name != state.config.model_name {
        return Err(ApiError::NotFound(format!("Model {model_name} is not registered")));
    }
    state.metrics.record_request();
    let started = Instant::now();

    let request_id = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let request = InferenceRequest::from_http_body(content_type, &body);
    let context = RequestContext::new(&model_name, &request_id);
    debug!("Prediction request {} ({} bytes)", request_id, body.len());

    let (tx, mut rx) = mpsc::channel::<Frame>(1);
    let sink = ChannelSink {
        tx: tx.clone(),
        metrics: state.metrics.clone(),
    };
    let handler = state.handler.clone();
    let metrics = state.metrics.clone();
    tokio::spawn(async move {
        match handler.handle(vec![request], context, sink).await {
            Ok(_) => metrics.record_completed(),
            Err(HandlerError::Disconnected) => {
                metrics.record_error();
                warn!("Client went away before request {} finished", request_id);
            }
            Err(e) => {
                metrics.record_error();
                let _ = tx.send(Frame::Failed(e)).await;
            }
        }
    });

    let mut response = match rx.recv().await {
        Some(Frame::Failed(e)) => return Err(e.into()),
        Some(Frame::Chunk(first)) => {
            state.metrics.record_first_chunk(started.elapsed());
            let rest = ReceiverStream::new(rx).map(|frame| match frame {
                Frame::Chunk(chunk) => Ok(chunk.body),
                Frame::Failed(e) => {
                    error!("Aborting audio stream: {e}");
                    Err(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
                }
            });
            let first = stream::once(async move { Ok::<Bytes, std::io::Error>(first.body) });
            Response::new(Body::from_stream(first.chain(rest)))
        }
        // The model produced no audio at all.
        None => Response::new(Body::empty()),
    };

    let response_headers = response.headers_mut();
    response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    if let Some(format) = state.handler.sample_format() {
        response_headers.insert(SAMPLE_RATE_HEADER, HeaderValue::from(format.sample_rate));
        response_headers.insert(SAMPLE_WIDTH_HEADER, HeaderValue::from(format.sample_width));
        response_headers.insert(CHANNELS_HEADER, HeaderValue::from(format.channels));
    }

    Ok(response)
}
