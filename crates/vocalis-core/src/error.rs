//! Error types for the speech core.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by encoders, model state, engines and the synthesis pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// Unsupported format or other static misconfiguration, raised before any engine work.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Engine not ready: {0}")]
    EngineNotReady(String),

    /// The engine produced no audio for a non-empty input.
    #[error("Empty output: {0}")]
    EmptyOutput(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    /// Catch-all for engine/encoder failures during synthesis. Always carries the cause.
    #[error("Synthesis failed: {0}")]
    Synthesis(String),

    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Model load failed: {0}")]
    ModelLoad(String),

    #[error("Worker bridge error: {0}")]
    Bridge(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap any failure that is not already part of the taxonomy as a synthesis error.
    pub(crate) fn into_synthesis(self) -> Self {
        match self {
            Error::Configuration(_)
            | Error::EngineNotReady(_)
            | Error::EmptyOutput(_)
            | Error::Timeout(_)
            | Error::Synthesis(_) => self,
            other => Error::Synthesis(other.to_string()),
        }
    }
}

/// A request rejected during validation, shaped after the OpenAI error object.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    pub message: String,
    pub param: &'static str,
    pub code: &'static str,
}

impl ValidationError {
    pub fn new(message: impl Into<String>, param: &'static str, code: &'static str) -> Self {
        Self {
            message: message.into(),
            param,
            code,
        }
    }
}
