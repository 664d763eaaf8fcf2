//! OpenAI-compatible speech synthesis endpoint.

use axum::{
    body::Body,
    extract::State,
    http::header,
    response::Response,
    Json,
};
use futures::StreamExt;
use tokio::sync::OwnedSemaphorePermit;
use tracing::{info, warn};
use vocalis_core::tts::{Delivery, SpeechJob, SpeechRequest, StreamFormat};

use crate::error::ApiError;
use crate::state::AppState;

pub async fn speech(
    State(state): State<AppState>,
    Json(req): Json<SpeechRequest>,
) -> Result<Response<Body>, ApiError> {
    info!(
        "[TTS] Speech request: {} chars, voice='{}', format='{}'",
        req.input.chars().count(),
        req.voice,
        req.response_format
    );

    let job = req
        .validate(state.config.max_input_chars, state.synthesizer.model())
        .map_err(|e| {
            warn!("[TTS] Rejected request: {} ({})", e, e.code);
            e
        })?;

    let permit = state.acquire_permit().await?;

    match job.delivery {
        Delivery::Bulk => {
            let audio = state.synthesizer.synthesize(&job).await?;
            drop(permit);

            Ok(Response::builder()
                .header(header::CONTENT_TYPE, job.format.content_type())
                .header(header::CONTENT_LENGTH, audio.len())
                .body(Body::from(audio))
                .unwrap())
        }
        Delivery::Stream(mode) => stream_speech(&state, &job, mode, permit),
    }
}

fn stream_speech(
    state: &AppState,
    job: &SpeechJob,
    mode: StreamFormat,
    permit: OwnedSemaphorePermit,
) -> Result<Response<Body>, ApiError> {
    let stream = state.synthesizer.synthesize_streaming(job, mode)?;
    let content_type = stream.content_type();

    // Dropping the body ends the session and returns the permit.
    let body = Body::from_stream(stream.map(move |unit| {
        let _held = &permit;
        unit
    }));

    let mut builder = Response::builder().header(header::CONTENT_TYPE, content_type);
    if mode == StreamFormat::Sse {
        builder = builder.header(header::CACHE_CONTROL, "no-cache");
    }
    Ok(builder.body(body).unwrap())
}
