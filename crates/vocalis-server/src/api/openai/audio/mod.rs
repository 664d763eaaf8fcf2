//! OpenAI-compatible audio resources.

pub mod speech;
pub mod transcriptions;

use axum::{extract::DefaultBodyLimit, routing::post, Router};

use crate::state::AppState;

/// Room for multipart boundaries and the text fields around the file.
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

pub fn router(upload_limit: usize) -> Router<AppState> {
    Router::new()
        .route("/audio/speech", post(speech::speech))
        .route(
            "/audio/transcriptions",
            post(transcriptions::transcriptions).layer(DefaultBodyLimit::max(
                upload_limit.saturating_add(MULTIPART_OVERHEAD_BYTES),
            )),
        )
}
