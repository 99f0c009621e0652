use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Failures of the inference handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Missing or empty request text.
    #[error("{0}")]
    InvalidInput(String),

    /// A byte payload that is not valid UTF-8.
    #[error("Request payload is not valid UTF-8: {0}")]
    Decode(#[from] std::string::FromUtf8Error),

    #[error("Model initialization failed: {0:#}")]
    Initialization(anyhow::Error),

    #[error("Inference failed: {0:#}")]
    Inference(anyhow::Error),

    #[error("Response stream closed by the receiver")]
    Disconnected,

    #[error("Inference task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// API Error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Handler(#[from] HandlerError),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Error response structure
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: u16,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Handler(HandlerError::InvalidInput(_))
            | ApiError::Handler(HandlerError::Decode(_)) => StatusCode::BAD_REQUEST,
            ApiError::Handler(HandlerError::Initialization(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Handler(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = self.to_string();
        if status.is_server_error() {
            tracing::error!("{}", error_message);
        }

        let body = Json(ErrorResponse {
            error: error_message,
            code: status.as_u16(),
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let invalid = ApiError::from(HandlerError::InvalidInput("No requests provided.".into()));
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

        let decode = String::from_utf8(vec![0xff, 0xfe]).unwrap_err();
        assert_eq!(ApiError::from(HandlerError::from(decode)).status(), StatusCode::BAD_REQUEST);

        let init = ApiError::from(HandlerError::Initialization(anyhow::anyhow!("no bucket")));
        assert_eq!(init.status(), StatusCode::SERVICE_UNAVAILABLE);

        let inference = ApiError::from(HandlerError::Inference(anyhow::anyhow!("oom")));
        assert_eq!(inference.status(), StatusCode::INTERNAL_SERVER_ERROR);

        assert_eq!(ApiError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_invalid_input_message_is_verbatim() {
        let err = ApiError::from(HandlerError::InvalidInput("No requests provided.".into()));
        assert_eq!(err.to_string(), "No requests provided.");
    }
}
