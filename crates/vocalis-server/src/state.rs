//! Application state shared by all handlers

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use vocalis_core::{ServiceConfig, SpeechSynthesizer, Transcriber};

use crate::error::ApiError;

/// Shared application state with backpressure on inference requests
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub synthesizer: Arc<SpeechSynthesizer>,
    pub transcriber: Arc<Transcriber>,
    /// Concurrency limiter to prevent resource exhaustion
    pub request_semaphore: Arc<Semaphore>,
}

impl AppState {
    pub fn new(
        config: ServiceConfig,
        synthesizer: SpeechSynthesizer,
        transcriber: Transcriber,
    ) -> Self {
        let max_concurrent = config.max_concurrent_requests.max(1);
        Self {
            config: Arc::new(config),
            synthesizer: Arc::new(synthesizer),
            transcriber: Arc::new(transcriber),
            request_semaphore: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    /// Acquire a permit for one inference request.
    ///
    /// The permit is owned so a streaming body can hold it until the
    /// session ends.
    pub async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit, ApiError> {
        self.request_semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ApiError::unavailable("Server is shutting down"))
    }
}
