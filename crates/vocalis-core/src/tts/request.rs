//! `/v1/audio/speech` request body and its validation.

use serde::Deserialize;

use super::transport::StreamFormat;
use crate::audio::AudioFormat;
use crate::error::ValidationError;
use crate::model::TtsModelState;

pub const MIN_SPEED: f32 = 0.25;
pub const MAX_SPEED: f32 = 4.0;

fn default_response_format() -> String {
    AudioFormat::Wav.as_str().to_string()
}

fn default_speed() -> f32 {
    1.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpeechRequest {
    #[serde(default)]
    pub model: String,
    pub input: String,
    pub voice: String,
    #[serde(default = "default_response_format")]
    pub response_format: String,
    #[serde(default = "default_speed")]
    pub speed: f32,
    #[serde(default)]
    pub stream_format: Option<String>,
    #[serde(default)]
    pub stream: Option<bool>,
}

/// How the synthesized audio leaves the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Bulk,
    Stream(StreamFormat),
}

/// A request that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechJob {
    pub text: String,
    pub voice: String,
    pub speed: f32,
    pub format: AudioFormat,
    pub delivery: Delivery,
}

impl SpeechRequest {
    /// Check the request against limits and the loaded model.
    ///
    /// The response format is checked first and never touches model state.
    /// Model and voice checks only apply when a model is loaded; otherwise
    /// synthesis reports the engine as not ready.
    pub fn validate(
        &self,
        max_input_chars: usize,
        model: &TtsModelState,
    ) -> Result<SpeechJob, ValidationError> {
        let format: AudioFormat = self.response_format.parse().map_err(|_| {
            ValidationError::new(
                format!(
                    "Unsupported response_format '{}'. Supported formats: {}",
                    self.response_format,
                    AudioFormat::supported_names()
                ),
                "response_format",
                "invalid_format",
            )
        })?;

        if self.input.trim().is_empty() {
            return Err(ValidationError::new(
                "Input text cannot be empty.",
                "input",
                "empty_input",
            ));
        }

        let chars = self.input.chars().count();
        if chars > max_input_chars {
            return Err(ValidationError::new(
                format!(
                    "Input text has {} characters, exceeding the maximum of {}.",
                    chars, max_input_chars
                ),
                "input",
                "context_length_exceeded",
            ));
        }

        if !(MIN_SPEED..=MAX_SPEED).contains(&self.speed) {
            return Err(ValidationError::new(
                format!(
                    "Speed must be between {} and {}, got {}.",
                    MIN_SPEED, MAX_SPEED, self.speed
                ),
                "speed",
                "invalid_speed",
            ));
        }

        let delivery = if self.stream == Some(false) {
            Delivery::Bulk
        } else {
            let stream_format = match self.stream_format.as_deref() {
                None => StreamFormat::Audio,
                Some(name) => name.parse().map_err(|_| {
                    ValidationError::new(
                        format!(
                            "Unsupported stream_format '{}'. Use 'audio' or 'sse'.",
                            name
                        ),
                        "stream_format",
                        "invalid_stream_format",
                    )
                })?,
            };
            Delivery::Stream(stream_format)
        };

        if let Some(loaded) = model.identity() {
            if !self.model.is_empty() && self.model != loaded.model_id {
                return Err(ValidationError::new(
                    format!(
                        "Model '{}' is not loaded. Currently loaded: '{}'.",
                        self.model, loaded.model_id
                    ),
                    "model",
                    "model_not_found",
                ));
            }
        }

        if let Some(engine) = model.handle() {
            let voices = engine.voices();
            if !voices.is_empty() && !voices.iter().any(|v| v == &self.voice) {
                return Err(ValidationError::new(
                    format!("Voice '{}' is not available.", self.voice),
                    "voice",
                    "voice_not_found",
                ));
            }
        }

        Ok(SpeechJob {
            text: self.input.clone(),
            voice: self.voice.clone(),
            speed: self.speed,
            format,
            delivery,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{SampleStream, SynthesisEngine};
    use crate::error::{Error, Result};
    use crate::model::{EngineLoader, TtsIdentity};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct VoiceList(Vec<String>);

    impl SynthesisEngine for VoiceList {
        fn run(&self, _: &str, _: &str, _: f32) -> Result<Box<dyn SampleStream>> {
            Err(Error::Synthesis("not used".into()))
        }

        fn voices(&self) -> Vec<String> {
            self.0.clone()
        }

        fn sample_rate(&self) -> u32 {
            24000
        }
    }

    struct Loader(AtomicUsize);

    impl EngineLoader<TtsIdentity, Arc<dyn SynthesisEngine>> for Loader {
        fn load(&self, _: &TtsIdentity) -> Result<Arc<dyn SynthesisEngine>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(VoiceList(vec!["af_heart".into(), "am_adam".into()])))
        }
    }

    fn empty_state() -> TtsModelState {
        TtsModelState::new("tts", Arc::new(Loader(AtomicUsize::new(0))), Duration::from_secs(5))
    }

    async fn loaded_state() -> TtsModelState {
        let state = empty_state();
        state
            .load(TtsIdentity::new("hexgrad/Kokoro-82M", "a"))
            .await
            .unwrap();
        state
    }

    fn request(input: &str) -> SpeechRequest {
        SpeechRequest {
            model: "hexgrad/Kokoro-82M".into(),
            input: input.into(),
            voice: "af_heart".into(),
            response_format: "pcm".into(),
            speed: 1.0,
            stream_format: None,
            stream: None,
        }
    }

    #[test]
    fn body_defaults_to_wav_at_normal_speed() {
        let req: SpeechRequest =
            serde_json::from_str(r#"{"model":"kokoro","input":"hi","voice":"af_heart"}"#).unwrap();
        assert_eq!(req.response_format, "wav");
        assert_eq!(req.speed, 1.0);
        assert!(req.stream.is_none());
    }

    #[test]
    fn length_limit_is_inclusive() {
        let state = empty_state();
        let at_limit = "AAAA".repeat(1024);
        assert_eq!(at_limit.chars().count(), 4096);
        assert!(request(&at_limit).validate(4096, &state).is_ok());

        let over = format!("{}A", at_limit);
        let err = request(&over).validate(4096, &state).unwrap_err();
        assert_eq!(err.code, "context_length_exceeded");
        assert_eq!(err.param, "input");
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        let state = empty_state();
        let text = "é".repeat(4096);
        assert!(request(&text).validate(4096, &state).is_ok());
    }

    #[tokio::test]
    async fn unknown_format_is_rejected_before_model_checks() {
        let state = loaded_state().await;
        let mut req = request("hello");
        req.response_format = "ogg_vorbis".into();
        req.model = "someone/else".into();
        req.voice = "nobody".into();

        let err = req.validate(4096, &state).unwrap_err();
        assert_eq!(err.code, "invalid_format");
        assert_eq!(err.param, "response_format");
    }

    #[test]
    fn blank_input_is_rejected() {
        let err = request("   \n").validate(4096, &empty_state()).unwrap_err();
        assert_eq!(err.code, "empty_input");
    }

    #[test]
    fn speed_bounds_are_inclusive() {
        let state = empty_state();
        for speed in [0.25, 4.0] {
            let mut req = request("hello");
            req.speed = speed;
            assert!(req.validate(4096, &state).is_ok());
        }
        for speed in [0.1, 4.5, f32::NAN] {
            let mut req = request("hello");
            req.speed = speed;
            assert_eq!(req.validate(4096, &state).unwrap_err().code, "invalid_speed");
        }
    }

    #[test]
    fn delivery_follows_stream_flags() {
        let state = empty_state();
        let mut req = request("hello");
        assert_eq!(
            req.validate(4096, &state).unwrap().delivery,
            Delivery::Stream(StreamFormat::Audio)
        );

        req.stream_format = Some("sse".into());
        assert_eq!(
            req.validate(4096, &state).unwrap().delivery,
            Delivery::Stream(StreamFormat::Sse)
        );

        req.stream = Some(false);
        assert_eq!(req.validate(4096, &state).unwrap().delivery, Delivery::Bulk);

        req.stream = None;
        req.stream_format = Some("websocket".into());
        assert_eq!(
            req.validate(4096, &state).unwrap_err().code,
            "invalid_stream_format"
        );
    }

    #[tokio::test]
    async fn model_and_voice_must_match_loaded_engine() {
        let state = loaded_state().await;

        let mut req = request("hello");
        req.model = "other/model".into();
        assert_eq!(req.validate(4096, &state).unwrap_err().code, "model_not_found");

        let mut req = request("hello");
        req.voice = "zz_unknown".into();
        assert_eq!(req.validate(4096, &state).unwrap_err().code, "voice_not_found");

        assert!(request("hello").validate(4096, &state).is_ok());
    }
}
