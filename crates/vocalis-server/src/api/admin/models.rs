//! Model download and load endpoints

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use vocalis_core::{SttIdentity, TtsIdentity};

use crate::error::ApiError;
use crate::state::AppState;

fn default_tts_model() -> String {
    "hexgrad/Kokoro-82M".to_string()
}

fn default_compute_type() -> String {
    "auto".to_string()
}

#[derive(Debug, Deserialize)]
pub struct TtsDownloadRequest {
    pub lang_code: String,
    #[serde(default = "default_tts_model")]
    pub model_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SttDownloadRequest {
    pub model_id: String,
    #[serde(default = "default_compute_type")]
    pub compute_type: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Fetch (if needed) and load a synthesis model, replacing the current one.
pub async fn download_tts_model(
    State(state): State<AppState>,
    Json(req): Json<TtsDownloadRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    info!(
        "Received request to download/load TTS model: {} for lang: {}",
        req.model_id, req.lang_code
    );

    let identity = TtsIdentity::new(&req.model_id, &req.lang_code);
    state.synthesizer.model().load(identity).await.map_err(|e| {
        error!("Failed to load TTS model '{}': {}", req.model_id, e);
        ApiError::internal(format!("Failed to load/download TTS model: {e}"))
    })?;

    Ok(Json(MessageResponse {
        message: format!(
            "TTS Model '{}' for lang '{}' loaded successfully.",
            req.model_id, req.lang_code
        ),
    }))
}

/// Fetch (if needed) and load a recognition model, replacing the current one.
pub async fn download_stt_model(
    State(state): State<AppState>,
    Json(req): Json<SttDownloadRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    info!(
        "Received request to download/load model: {} with compute_type: {}",
        req.model_id, req.compute_type
    );

    let identity = SttIdentity::new(&req.model_id, &req.compute_type);
    state.transcriber.model().load(identity).await.map_err(|e| {
        error!("Failed to load STT model '{}': {}", req.model_id, e);
        ApiError::internal(format!("Failed to load/download model: {e}"))
    })?;

    Ok(Json(MessageResponse {
        message: format!(
            "Model '{}' (compute_type={}) loaded successfully.",
            req.model_id, req.compute_type
        ),
    }))
}
