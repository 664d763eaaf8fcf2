//! API error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::warn;
use vocalis_core::{Error, ValidationError};

/// OpenAI-shaped API error
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub error_type: &'static str,
    pub param: Option<String>,
    pub code: Option<String>,
}

impl ApiError {
    fn new(status: StatusCode, error_type: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            error_type,
            param: None,
            code: None,
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request_error", msg)
    }

    pub fn payload_too_large(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::PAYLOAD_TOO_LARGE, "invalid_request_error", msg)
            .with_code("file_too_large")
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "server_error", msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "server_error", msg)
    }

    pub fn with_param(mut self, param: impl Into<String>) -> Self {
        self.param = Some(param.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "message": self.message,
                "type": self.error_type,
                "param": self.param,
                "code": self.code,
            }
        }));
        (self.status, body).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let message = err.to_string();
        let api = match &err {
            Error::Configuration(_) => ApiError::bad_request(message).with_code("invalid_format"),
            Error::InvalidInput(_) => ApiError::bad_request(message),
            Error::EngineNotReady(_) => ApiError::unavailable(message).with_code("model_not_loaded"),
            Error::Timeout(_) => {
                ApiError::new(StatusCode::REQUEST_TIMEOUT, "server_error", message).with_code("timeout")
            }
            Error::EmptyOutput(_) => ApiError::internal(message).with_code("empty_output"),
            Error::Synthesis(_) => ApiError::internal(message).with_code("synthesis_failed"),
            Error::Transcription(_) => ApiError::internal(message).with_code("transcription_failed"),
            Error::ModelLoad(_) | Error::Bridge(_) | Error::Io(_) => ApiError::internal(message),
        };
        if api.status.is_server_error() {
            warn!("Request failed with {}: {}", api.status, api.message);
        }
        api
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::bad_request(err.message)
            .with_param(err.param)
            .with_code(err.code)
    }
}
