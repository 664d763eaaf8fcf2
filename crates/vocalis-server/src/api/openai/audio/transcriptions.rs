//! OpenAI-compatible transcription endpoint.

use axum::{
    body::Bytes,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tracing::{info, warn};
use vocalis_core::engine::TranscribeOptions;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Default)]
struct TranscriptionForm {
    file: Option<Bytes>,
    model: Option<String>,
    language: Option<String>,
    prompt: Option<String>,
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
pub struct TranscriptionResponse {
    pub text: String,
}

pub async fn transcriptions(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<TranscriptionResponse>, ApiError> {
    let multipart =
        multipart.map_err(|e| ApiError::bad_request(format!("Invalid multipart payload: {e}")))?;
    let form = read_form(multipart).await?;

    info!(
        "[STT] Received transcription request: model={:?}, language={:?}, temperature={:?}",
        form.model, form.language, form.temperature
    );

    if let Some(requested) = form.model.as_deref().filter(|m| !m.is_empty()) {
        if let Some(loaded) = state.transcriber.model().identity() {
            if requested != loaded.model_id {
                warn!(
                    "[STT] Rejected request: model mismatch (requested='{}', loaded='{}')",
                    requested, loaded.model_id
                );
                return Err(ApiError::bad_request(format!(
                    "Invalid model parameter: '{requested}'"
                ))
                .with_param("model")
                .with_code("model_not_found"));
            }
        }
    }

    let audio = form.file.ok_or_else(|| {
        ApiError::bad_request("Missing 'file' field in multipart payload").with_param("file")
    })?;

    let limit = state.config.max_upload_bytes;
    if audio.len() > limit {
        warn!("[STT] Rejected request: file too large ({} > {})", audio.len(), limit);
        return Err(too_large(limit));
    }

    let options = TranscribeOptions {
        language: form.language,
        initial_prompt: form.prompt,
        temperature: form.temperature.unwrap_or(0.0),
        ..TranscribeOptions::default()
    };

    let _permit = state.acquire_permit().await?;
    let text = state.transcriber.transcribe(audio.to_vec(), options).await?;

    Ok(Json(TranscriptionResponse { text }))
}

async fn read_form(mut multipart: Multipart) -> Result<TranscriptionForm, ApiError> {
    let mut form = TranscriptionForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_field_error("<next>", e))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| multipart_field_error(&name, e))?;
                info!("[STT] Read file content, size={} bytes", bytes.len());
                form.file = Some(bytes);
            }
            "model" | "language" | "prompt" | "temperature" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| multipart_field_error(&name, e))?;
                let text = text.trim().to_string();
                match name.as_str() {
                    "model" => form.model = Some(text),
                    "language" => form.language = Some(text).filter(|l| !l.is_empty()),
                    "prompt" => form.prompt = Some(text).filter(|p| !p.is_empty()),
                    _ => {
                        let value = text.parse::<f32>().map_err(|_| {
                            ApiError::bad_request(format!("Invalid temperature '{text}'"))
                                .with_param("temperature")
                        })?;
                        form.temperature = Some(value);
                    }
                }
            }
            _ => {}
        }
    }

    Ok(form)
}

fn too_large(limit: usize) -> ApiError {
    ApiError::payload_too_large(format!(
        "File size exceeds the maximum limit of {}MB.",
        limit / (1024 * 1024)
    ))
    .with_param("file")
}

fn multipart_field_error(field_name: &str, err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ApiError::payload_too_large(format!(
            "Upload rejected while reading '{}': {}",
            field_name,
            err.body_text()
        ))
        .with_param("file");
    }
    ApiError::bad_request(format!(
        "Failed reading multipart '{}' field: {}",
        field_name,
        err.body_text()
    ))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use vocalis_core::ServiceConfig;

    use crate::api::testing::{loaded_state, multipart_request, send, state_with, STT_MODEL};

    #[tokio::test]
    async fn returns_joined_text() {
        let app = crate::api::create_router(loaded_state().await);
        let request = multipart_request(&[
            ("file", b"RIFF-dummy-audio".as_slice()),
            ("model", STT_MODEL.as_bytes()),
            ("language", b"en"),
        ]);

        let (status, _, body) = send(app, request).await;
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, serde_json::json!({"text": "hello world"}));
    }

    #[tokio::test]
    async fn model_mismatch_is_rejected() {
        let app = crate::api::create_router(loaded_state().await);
        let request = multipart_request(&[
            ("file", b"dummy content".as_slice()),
            ("model", b"requested_model"),
        ]);

        let (status, _, body) = send(app, request).await;
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "model_not_found");
        assert_eq!(json["error"]["param"], "model");
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected() {
        let config = ServiceConfig {
            max_upload_bytes: 10,
            ..ServiceConfig::default()
        };
        let app = crate::api::create_router(state_with(config, true, true).await);
        let request = multipart_request(&[("file", b"12345678901".as_slice())]);

        let (status, _, body) = send(app, request).await;
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(json["error"]["code"], "file_too_large");
    }

    #[tokio::test]
    async fn engine_failure_is_a_server_error() {
        let app = crate::api::create_router(loaded_state().await);
        let request = multipart_request(&[("file", b"".as_slice())]);

        let (status, _, body) = send(app, request).await;
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"]["code"], "transcription_failed");
        assert!(json["error"]["message"]
            .as_str()
            .unwrap()
            .contains("Invalid data"));
    }

    #[tokio::test]
    async fn missing_file_is_a_bad_request() {
        let app = crate::api::create_router(loaded_state().await);
        let request = multipart_request(&[("model", STT_MODEL.as_bytes())]);

        let (status, _, body) = send(app, request).await;
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["param"], "file");
    }

    #[tokio::test]
    async fn requires_loaded_model() {
        let app = crate::api::create_router(state_with(ServiceConfig::default(), true, false).await);
        let request = multipart_request(&[("file", b"audio".as_slice())]);

        let (status, _, _) = send(app, request).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
