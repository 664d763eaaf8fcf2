//! Speech-to-text on top of the loaded transcription engine.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::config::ServiceConfig;
use crate::engine::{SegmentStream, TranscribeOptions, TranscriptionEngine};
use crate::error::{Error, Result};
use crate::model::SttModelState;

pub struct Transcriber {
    model: Arc<SttModelState>,
    call_timeout: Duration,
    processing_timeout: Duration,
}

impl Transcriber {
    pub fn new(model: Arc<SttModelState>, call_timeout: Duration, processing_timeout: Duration) -> Self {
        Self {
            model,
            call_timeout,
            processing_timeout,
        }
    }

    pub fn from_config(model: Arc<SttModelState>, config: &ServiceConfig) -> Self {
        Self::new(
            model,
            config.transcription_timeout(),
            config.transcription_processing_timeout(),
        )
    }

    pub fn model(&self) -> &Arc<SttModelState> {
        &self.model
    }

    /// Transcribe `audio` and return the joined segment text.
    pub async fn transcribe(&self, audio: Vec<u8>, options: TranscribeOptions) -> Result<String> {
        let engine: Arc<dyn TranscriptionEngine> = self.model.require().map_err(|e| {
            error!("[STT] Transcription requested but no model is loaded");
            e
        })?;

        info!("[STT] Starting transcription of {} bytes", audio.len());

        let call = tokio::task::spawn_blocking(move || engine.transcribe(&audio, &options));
        let (info, segments) = match tokio::time::timeout(self.call_timeout, call).await {
            Err(_) => return Err(self.timed_out(self.call_timeout)),
            Ok(Err(join)) => {
                return Err(Error::Transcription(format!("Transcription task failed: {}", join)))
            }
            Ok(Ok(result)) => result.map_err(wrap)?,
        };

        info!(
            "[STT] Detected language '{}' with probability {:.2}",
            info.language, info.language_probability
        );

        let collect = tokio::task::spawn_blocking(move || join_segments(segments));
        let text = match tokio::time::timeout(self.processing_timeout, collect).await {
            Err(_) => return Err(self.timed_out(self.processing_timeout)),
            Ok(Err(join)) => {
                return Err(Error::Transcription(format!("Segment task failed: {}", join)))
            }
            Ok(Ok(result)) => result.map_err(wrap)?,
        };

        info!("[STT] Transcription complete, result_length={}", text.chars().count());
        Ok(text)
    }

    fn timed_out(&self, limit: Duration) -> Error {
        error!("[STT] Transcription timed out after {} seconds", limit.as_secs());
        Error::Timeout(format!(
            "Transcription timed out after {} seconds",
            limit.as_secs()
        ))
    }
}

fn join_segments(mut segments: Box<dyn SegmentStream>) -> Result<String> {
    let mut texts = Vec::new();
    while let Some(segment) = segments.next_segment()? {
        texts.push(segment.text);
    }
    Ok(texts.join(" ").trim().to_string())
}

fn wrap(e: Error) -> Error {
    error!("[STT] Transcription failed: {}", e);
    match e {
        Error::Transcription(_) | Error::Timeout(_) | Error::EngineNotReady(_) => e,
        other => Error::Transcription(other.to_string()),
    }
}
