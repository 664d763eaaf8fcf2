//! Vocalis Core - streaming speech synthesis and transcription pipeline
//!
//! This crate turns the output of external speech engines into correctly
//! framed audio for an OpenAI-compatible speech API.
//!
//! # Architecture
//!
//! - [`audio`]: per-format streaming encoders (PCM, WAV, and with the
//!   `ffmpeg` feature MP3, AAC, Opus, FLAC)
//! - [`model`]: single-flight loading of engine handles
//! - [`engine`]: contracts for the synthesis and transcription engines
//! - [`bridge`]: engines hosted by an out-of-process speech worker
//! - [`tts`]: bulk and streaming synthesis, chunked-audio and SSE framing
//! - [`stt`]: transcription with bounded engine calls
//!
//! # Example
//!
//! ```ignore
//! use vocalis_core::tts::{SpeechRequest, StreamFormat};
//!
//! let job = request.validate(config.max_input_chars, synthesizer.model())?;
//! let stream = synthesizer.synthesize_streaming(&job, StreamFormat::Sse)?;
//! ```

pub mod audio;
pub mod bridge;
pub mod config;
pub mod engine;
pub mod error;
pub mod health;
pub mod model;
pub mod stt;
pub mod tts;

pub use audio::{AudioEncoder, AudioFormat, EncoderSettings};
pub use config::ServiceConfig;
pub use error::{Error, Result, ValidationError};
pub use health::HealthReport;
pub use model::{SttIdentity, SttModelState, TtsIdentity, TtsModelState};
pub use stt::Transcriber;
pub use tts::{SpeechStream, SpeechSynthesizer};
