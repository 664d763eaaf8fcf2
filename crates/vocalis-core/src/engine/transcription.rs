use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Decoding options passed through to the recognition engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscribeOptions {
    pub language: Option<String>,
    pub initial_prompt: Option<String>,
    pub temperature: f32,
    pub beam_size: u32,
    pub vad_filter: bool,
    pub min_silence_duration_ms: u32,
}

impl Default for TranscribeOptions {
    fn default() -> Self {
        Self {
            language: None,
            initial_prompt: None,
            temperature: 0.0,
            beam_size: 5,
            vad_filter: true,
            min_silence_duration_ms: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionInfo {
    pub language: String,
    pub language_probability: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Lazy sequence of recognized segments. Decoding happens as it is pulled.
pub trait SegmentStream: Send {
    fn next_segment(&mut self) -> Result<Option<Segment>>;
}

/// A loaded speech-to-text engine.
pub trait TranscriptionEngine: Send + Sync {
    fn transcribe(
        &self,
        audio: &[u8],
        options: &TranscribeOptions,
    ) -> Result<(TranscriptionInfo, Box<dyn SegmentStream>)>;
}
