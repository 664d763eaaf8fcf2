//! Wire format spoken with the speech worker.
//!
//! Every message is a 4-byte big-endian length followed by a JSON object.
//! Requests carry a `command`; replies carry a `type`.

use std::io::{ErrorKind, Read, Write};

use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::engine::TranscribeOptions;
use crate::error::{Error, Result};

/// Upper bound on a single reply frame.
const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Default, Serialize)]
pub struct WorkerRequest {
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lang_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compute_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<TranscribeOptions>,
}

impl WorkerRequest {
    pub fn command(command: &str) -> Self {
        Self {
            command: command.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerFrame {
    Status {
        status: String,
        #[serde(default)]
        voices: Vec<String>,
        #[serde(default)]
        sample_rate: Option<u32>,
        #[serde(default)]
        device: Option<String>,
        #[serde(default)]
        error: Option<String>,
    },
    Audio {
        samples_base64: String,
        #[serde(default)]
        graphemes: String,
        #[serde(default)]
        phonemes: String,
    },
    Skip {
        #[serde(default)]
        graphemes: String,
        #[serde(default)]
        phonemes: String,
    },
    Info {
        language: String,
        language_probability: f32,
    },
    Segment {
        start: f64,
        end: f64,
        text: String,
    },
    Done,
    Error {
        message: String,
    },
}

pub fn write_frame<W: Write>(writer: &mut W, request: &WorkerRequest) -> Result<()> {
    let body = serde_json::to_vec(request)
        .map_err(|e| Error::Bridge(format!("Failed to serialize request: {}", e)))?;

    writer
        .write_all(&(body.len() as u32).to_be_bytes())
        .map_err(io_error)?;
    writer.write_all(&body).map_err(io_error)?;
    writer.flush().map_err(io_error)?;
    Ok(())
}

pub fn read_frame<R: Read>(reader: &mut R) -> Result<WorkerFrame> {
    let mut length = [0u8; 4];
    reader.read_exact(&mut length).map_err(io_error)?;
    let length = u32::from_be_bytes(length) as usize;
    if length > MAX_FRAME_BYTES {
        return Err(Error::Bridge(format!("Frame of {} bytes exceeds limit", length)));
    }

    let mut body = vec![0u8; length];
    reader.read_exact(&mut body).map_err(io_error)?;

    serde_json::from_slice(&body).map_err(|e| {
        Error::Bridge(format!(
            "Failed to parse frame: {} - {}",
            e,
            String::from_utf8_lossy(&body)
        ))
    })
}

/// Little-endian f32 samples, base64 encoded.
pub fn decode_samples(encoded: &str) -> Result<Vec<f32>> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| Error::Bridge(format!("Invalid sample payload: {}", e)))?;
    if bytes.len() % 4 != 0 {
        return Err(Error::Bridge(format!(
            "Sample payload of {} bytes is not f32 aligned",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

pub fn encode_bytes(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Read timeouts surface as [`Error::Timeout`] so a stalled pull is bounded.
fn io_error(e: std::io::Error) -> Error {
    match e.kind() {
        ErrorKind::WouldBlock | ErrorKind::TimedOut => {
            Error::Timeout(format!("Speech worker did not respond: {}", e))
        }
        ErrorKind::UnexpectedEof => Error::Bridge("Speech worker closed the connection".to_string()),
        _ => Error::Bridge(format!("Speech worker I/O failed: {}", e)),
    }
}
