//! Health check endpoint

use axum::{extract::State, Json};
use vocalis_core::HealthReport;

use crate::state::AppState;

/// Readiness of both models; always answers 200 so callers can read the body.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthReport> {
    Json(HealthReport::from_readiness(
        state.transcriber.model().is_ready(),
        state.synthesizer.model().is_ready(),
    ))
}
