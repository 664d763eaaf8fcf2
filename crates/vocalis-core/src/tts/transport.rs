//! Wire framing for streamed speech: raw chunked audio or Server-Sent Events.

use std::fmt;
use std::str::FromStr;

use base64::Engine as _;
use bytes::Bytes;
use serde::Serialize;

use crate::error::{Error, Result};

pub const SSE_CONTENT_TYPE: &str = "text/event-stream";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFormat {
    Audio,
    Sse,
}

impl StreamFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamFormat::Audio => "audio",
            StreamFormat::Sse => "sse",
        }
    }

    pub(crate) fn log_prefix(&self) -> &'static str {
        match self {
            StreamFormat::Audio => "[AUDIO]",
            StreamFormat::Sse => "[SSE]",
        }
    }
}

impl fmt::Display for StreamFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StreamFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "audio" => Ok(StreamFormat::Audio),
            "sse" => Ok(StreamFormat::Sse),
            _ => Err(Error::InvalidInput(format!("Unsupported stream format: {}", s))),
        }
    }
}

/// Delivery state of one streaming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    HeaderPending,
    Streaming,
    Finalizing,
    Done,
    Errored,
}

#[derive(Serialize)]
struct AudioDelta<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    audio: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Usage {
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub total_tokens: usize,
}

impl Usage {
    /// Character count of the input stands in for both token counts.
    pub fn from_input(text: &str) -> Self {
        let chars = text.chars().count();
        Self {
            input_tokens: chars,
            output_tokens: chars,
            total_tokens: chars * 2,
        }
    }
}

#[derive(Serialize)]
struct AudioDone {
    #[serde(rename = "type")]
    kind: &'static str,
    usage: Usage,
}

#[derive(Serialize)]
struct StreamError<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    error: StreamErrorBody<'a>,
}

#[derive(Serialize)]
struct StreamErrorBody<'a> {
    message: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
}

fn sse_event<T: Serialize>(event: &T) -> Bytes {
    // Event payloads are plain structs of strings and integers.
    let json = serde_json::to_string(event).unwrap_or_default();
    Bytes::from(format!("data: {}\n\n", json))
}

pub fn audio_delta_event(audio: &[u8]) -> Bytes {
    let encoded = base64::engine::general_purpose::STANDARD.encode(audio);
    sse_event(&AudioDelta {
        kind: "speech.audio.delta",
        audio: &encoded,
    })
}

pub fn audio_done_event(input: &str) -> Bytes {
    sse_event(&AudioDone {
        kind: "speech.audio.done",
        usage: Usage::from_input(input),
    })
}

pub fn error_event(message: &str) -> Bytes {
    sse_event(&StreamError {
        kind: "error",
        error: StreamErrorBody {
            message,
            kind: "server_error",
        },
    })
}

/// Frames encoder output for one protocol.
///
/// Chunked audio sends the container header eagerly. SSE holds it back and
/// prepends it to the first non-empty payload so every event is
/// self-describing.
pub(crate) struct Framer {
    mode: StreamFormat,
    pending_header: Option<Vec<u8>>,
}

impl Framer {
    /// Returns the framer and, for chunked audio, the header to send right away.
    pub(crate) fn new(mode: StreamFormat, header: Option<Vec<u8>>) -> (Self, Option<Bytes>) {
        let header = header.filter(|h| !h.is_empty());
        match mode {
            StreamFormat::Audio => (
                Self {
                    mode,
                    pending_header: None,
                },
                header.map(Bytes::from),
            ),
            StreamFormat::Sse => (
                Self {
                    mode,
                    pending_header: header,
                },
                None,
            ),
        }
    }

    /// Frame one encoded payload. Empty payloads produce nothing.
    pub(crate) fn payload(&mut self, encoded: Vec<u8>) -> Option<Bytes> {
        if encoded.is_empty() {
            return None;
        }
        match self.mode {
            StreamFormat::Audio => Some(Bytes::from(encoded)),
            StreamFormat::Sse => {
                let body = match self.pending_header.take() {
                    Some(mut header) => {
                        header.extend_from_slice(&encoded);
                        header
                    }
                    None => encoded,
                };
                Some(audio_delta_event(&body))
            }
        }
    }

    pub(crate) fn done(&self, input: &str) -> Option<Bytes> {
        match self.mode {
            StreamFormat::Audio => None,
            StreamFormat::Sse => Some(audio_done_event(input)),
        }
    }
}
