//! Drives the synthesis engine through an encoder, whole or incrementally.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::request::SpeechJob;
use super::session::{Session, SpeechStream};
use super::transport::StreamFormat;
use crate::audio::{AudioEncoder, EncoderSettings};
use crate::config::ServiceConfig;
use crate::engine::{EngineSequence, SynthesisEngine};
use crate::error::{Error, Result};
use crate::model::TtsModelState;

pub struct SpeechSynthesizer {
    model: Arc<TtsModelState>,
    settings: EncoderSettings,
    sample_rate: u32,
    synthesis_timeout: Duration,
    pull_timeout: Duration,
}

impl SpeechSynthesizer {
    pub fn new(
        model: Arc<TtsModelState>,
        settings: EncoderSettings,
        sample_rate: u32,
        synthesis_timeout: Duration,
        pull_timeout: Duration,
    ) -> Self {
        Self {
            model,
            settings,
            sample_rate,
            synthesis_timeout,
            pull_timeout,
        }
    }

    pub fn from_config(model: Arc<TtsModelState>, config: &ServiceConfig) -> Self {
        Self::new(
            model,
            config.encoder_settings(),
            config.sample_rate,
            config.synthesis_timeout(),
            config.engine_pull_timeout(),
        )
    }

    pub fn model(&self) -> &Arc<TtsModelState> {
        &self.model
    }

    /// Synthesize the whole input and return one encoded blob.
    ///
    /// All or nothing: on timeout the engine sequence is abandoned and no
    /// bytes are returned.
    pub async fn synthesize(&self, job: &SpeechJob) -> Result<Vec<u8>> {
        let encoder = AudioEncoder::new(job.format, self.sample_rate, &self.settings)?;
        let engine = self.ready_engine()?;

        info!(
            "[TTS] Synthesizing speech: text_length={}, voice='{}', format='{}'",
            job.text.chars().count(),
            job.voice,
            job.format
        );

        let cancel = CancellationToken::new();
        let work = {
            let cancel = cancel.clone();
            let (text, voice, speed) = (job.text.clone(), job.voice.clone(), job.speed);
            tokio::task::spawn_blocking(move || {
                render(engine.as_ref(), &text, &voice, speed, encoder, &cancel)
            })
        };

        match tokio::time::timeout(self.synthesis_timeout, work).await {
            Err(_) => {
                cancel.cancel();
                error!(
                    "[TTS] Synthesis timed out after {} seconds",
                    self.synthesis_timeout.as_secs()
                );
                Err(Error::Timeout(format!(
                    "Speech synthesis timed out after {} seconds",
                    self.synthesis_timeout.as_secs()
                )))
            }
            Ok(Err(join)) => Err(Error::Synthesis(format!("Synthesis task failed: {}", join))),
            Ok(Ok(result)) => result.map_err(|e| {
                error!("[TTS] Synthesis failed: {}", e);
                e.into_synthesis()
            }),
        }
    }

    /// Start a streaming session. Returns as soon as the session is spawned.
    pub fn synthesize_streaming(&self, job: &SpeechJob, mode: StreamFormat) -> Result<SpeechStream> {
        let encoder = AudioEncoder::new(job.format, self.sample_rate, &self.settings)?;
        let engine = self.ready_engine()?;

        let session = Session {
            engine,
            text: job.text.clone(),
            voice: job.voice.clone(),
            speed: job.speed,
            encoder,
            mode,
            pull_timeout: self.pull_timeout,
        };
        Ok(session.start(CancellationToken::new()))
    }

    fn ready_engine(&self) -> Result<Arc<dyn SynthesisEngine>> {
        let engine = self.model.require().map_err(|e| {
            error!("[TTS] Synthesis requested but no model is loaded");
            e
        })?;
        if engine.sample_rate() != self.sample_rate {
            return Err(Error::Configuration(format!(
                "Engine produces {} Hz audio but the service is configured for {} Hz",
                engine.sample_rate(),
                self.sample_rate
            )));
        }
        Ok(engine)
    }
}

/// Pull the full sequence, concatenate and encode in one pass.
fn render(
    engine: &dyn SynthesisEngine,
    text: &str,
    voice: &str,
    speed: f32,
    encoder: AudioEncoder,
    cancel: &CancellationToken,
) -> Result<Vec<u8>> {
    let mut sequence = EngineSequence::new(engine.run(text, voice, speed)?);
    let mut signal = Vec::new();
    let mut buffers = 0usize;

    while let Some(step) = sequence.pull()? {
        if cancel.is_cancelled() {
            return Err(Error::Timeout("Synthesis abandoned".to_string()));
        }
        if let Some(samples) = step.into_samples() {
            buffers += 1;
            signal.extend_from_slice(&samples);
        }
    }
    sequence.release();

    if buffers == 0 {
        return Err(Error::EmptyOutput(
            "Audio generation failed, received no audio output.".to_string(),
        ));
    }

    info!(
        "[TTS] Speech synthesized: buffers={}, total_samples={}. Encoding to {}.",
        buffers,
        signal.len(),
        encoder.format()
    );
    encoder.encode_all(&signal)
}
