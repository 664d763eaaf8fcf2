//! Model administration namespace.

pub mod models;

use axum::{routing::post, Router};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/models/tts/download", post(models::download_tts_model))
        .route("/models/stt/download", post(models::download_stt_model))
}
