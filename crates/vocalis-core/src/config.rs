//! Configuration types for the Vocalis speech service

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::audio::EncoderSettings;

const VALID_COMPUTE_TYPES: &[&str] = &["auto", "int8", "float16", "int8_float16", "float32"];

/// Main service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Interface to bind the HTTP server to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind the HTTP server to
    #[serde(default = "default_port")]
    pub port: u16,

    /// Speech synthesis model loaded at startup
    #[serde(default = "default_tts_model")]
    pub tts_model: String,

    /// Single-character language code for the synthesis pipeline
    #[serde(default = "default_tts_lang_code")]
    pub tts_lang_code: String,

    /// Speech recognition model loaded at startup
    #[serde(default = "default_stt_model")]
    pub stt_model: String,

    /// Compute precision for the recognition model
    #[serde(default = "default_stt_compute_type")]
    pub stt_compute_type: String,

    /// Force inference onto `cpu` or `cuda`
    #[serde(default = "default_device_override")]
    pub device_override: Option<String>,

    /// Output sample rate of the synthesis engine (Hz)
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Maximum accepted input length for synthesis, in characters
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,

    /// Maximum accepted upload size for transcription, in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    #[serde(default = "default_synthesis_timeout_secs")]
    pub synthesis_timeout_secs: u64,

    #[serde(default = "default_model_load_timeout_secs")]
    pub model_load_timeout_secs: u64,

    #[serde(default = "default_transcription_timeout_secs")]
    pub transcription_timeout_secs: u64,

    #[serde(default = "default_transcription_processing_timeout_secs")]
    pub transcription_processing_timeout_secs: u64,

    /// Upper bound for a single pull from the synthesis engine
    #[serde(default = "default_engine_pull_timeout_secs")]
    pub engine_pull_timeout_secs: u64,

    #[serde(default = "default_mp3_bitrate_kbps")]
    pub mp3_bitrate_kbps: u32,

    #[serde(default = "default_aac_bitrate_kbps")]
    pub aac_bitrate_kbps: u32,

    #[serde(default = "default_opus_bitrate_kbps")]
    pub opus_bitrate_kbps: u32,

    /// Concurrent inference requests admitted by the server
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,

    /// Unix socket of the inference worker daemon
    #[serde(default = "default_worker_socket")]
    pub worker_socket: PathBuf,

    /// Command used to start the worker daemon when it is not reachable
    #[serde(default = "default_worker_command")]
    pub worker_command: String,

    #[serde(default = "default_worker_start_timeout_secs")]
    pub worker_start_timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            tts_model: default_tts_model(),
            tts_lang_code: default_tts_lang_code(),
            stt_model: default_stt_model(),
            stt_compute_type: default_stt_compute_type(),
            device_override: default_device_override(),
            sample_rate: default_sample_rate(),
            max_input_chars: default_max_input_chars(),
            max_upload_bytes: default_max_upload_bytes(),
            synthesis_timeout_secs: default_synthesis_timeout_secs(),
            model_load_timeout_secs: default_model_load_timeout_secs(),
            transcription_timeout_secs: default_transcription_timeout_secs(),
            transcription_processing_timeout_secs: default_transcription_processing_timeout_secs(),
            engine_pull_timeout_secs: default_engine_pull_timeout_secs(),
            mp3_bitrate_kbps: default_mp3_bitrate_kbps(),
            aac_bitrate_kbps: default_aac_bitrate_kbps(),
            opus_bitrate_kbps: default_opus_bitrate_kbps(),
            max_concurrent_requests: default_max_concurrent_requests(),
            worker_socket: default_worker_socket(),
            worker_command: default_worker_command(),
            worker_start_timeout_secs: default_worker_start_timeout_secs(),
        }
    }
}

impl ServiceConfig {
    /// Build the configuration from the process environment.
    ///
    /// Every field has a documented default; environment variables only
    /// override the fields they name.
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Check values that are accepted but probably wrong.
    ///
    /// Returns human readable warnings; nothing here prevents startup.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if !VALID_COMPUTE_TYPES.contains(&self.stt_compute_type.as_str()) {
            warnings.push(format!(
                "Invalid STT_COMPUTE_TYPE '{}'. Valid values: {:?}",
                self.stt_compute_type, VALID_COMPUTE_TYPES
            ));
        }

        if self.tts_lang_code.chars().count() != 1 {
            warnings.push(format!(
                "Invalid TTS_LANG_CODE '{}'. Should be a single character.",
                self.tts_lang_code
            ));
        }

        if let Some(device) = &self.device_override {
            if device != "cpu" && device != "cuda" {
                warnings.push(format!(
                    "Invalid DEVICE_OVERRIDE '{}'. Valid values: 'cpu', 'cuda'",
                    device
                ));
            }
        }

        warnings
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn synthesis_timeout(&self) -> Duration {
        Duration::from_secs(self.synthesis_timeout_secs)
    }

    pub fn model_load_timeout(&self) -> Duration {
        Duration::from_secs(self.model_load_timeout_secs)
    }

    pub fn transcription_timeout(&self) -> Duration {
        Duration::from_secs(self.transcription_timeout_secs)
    }

    pub fn transcription_processing_timeout(&self) -> Duration {
        Duration::from_secs(self.transcription_processing_timeout_secs)
    }

    pub fn engine_pull_timeout(&self) -> Duration {
        Duration::from_secs(self.engine_pull_timeout_secs)
    }

    pub fn worker_start_timeout(&self) -> Duration {
        Duration::from_secs(self.worker_start_timeout_secs)
    }

    /// Codec settings handed to every encoder created for a session.
    pub fn encoder_settings(&self) -> EncoderSettings {
        EncoderSettings {
            mp3_bitrate_kbps: self.mp3_bitrate_kbps,
            aac_bitrate_kbps: self.aac_bitrate_kbps,
            opus_bitrate_kbps: self.opus_bitrate_kbps,
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parsed<T: std::str::FromStr>(key: &str, fallback: T) -> T {
    match env_string(key) {
        Some(raw) => match raw.parse::<T>() {
            Ok(parsed) => parsed,
            Err(_) => {
                tracing::warn!("Invalid {}='{}', using default", key, raw);
                fallback
            }
        },
        None => fallback,
    }
}

fn default_host() -> String {
    env_string("VOCALIS_HOST").unwrap_or_else(|| "0.0.0.0".to_string())
}

fn default_port() -> u16 {
    env_parsed("VOCALIS_PORT", 8000)
}

fn default_tts_model() -> String {
    env_string("TTS_MODEL_NAME").unwrap_or_else(|| "hexgrad/Kokoro-82M".to_string())
}

fn default_tts_lang_code() -> String {
    // An empty value is reported by `validate`, not silently replaced.
    std::env::var("TTS_LANG_CODE").unwrap_or_else(|_| "a".to_string())
}

fn default_stt_model() -> String {
    env_string("STT_MODEL_NAME")
        .unwrap_or_else(|| "Systran/faster-distil-whisper-small.en".to_string())
}

fn default_stt_compute_type() -> String {
    env_string("STT_COMPUTE_TYPE").unwrap_or_else(|| "auto".to_string())
}

fn default_device_override() -> Option<String> {
    env_string("DEVICE_OVERRIDE")
}

fn default_sample_rate() -> u32 {
    24000
}

fn default_max_input_chars() -> usize {
    4096
}

fn default_max_upload_bytes() -> usize {
    50 * 1024 * 1024
}

fn default_synthesis_timeout_secs() -> u64 {
    env_parsed("TTS_SYNTHESIS_TIMEOUT_SECS", 120)
}

fn default_model_load_timeout_secs() -> u64 {
    env_parsed("MODEL_LOAD_TIMEOUT_SECS", 600)
}

fn default_transcription_timeout_secs() -> u64 {
    env_parsed("TRANSCRIPTION_TIMEOUT_SECS", 300)
}

fn default_transcription_processing_timeout_secs() -> u64 {
    180
}

fn default_engine_pull_timeout_secs() -> u64 {
    env_parsed("ENGINE_PULL_TIMEOUT_SECS", 60)
}

fn default_mp3_bitrate_kbps() -> u32 {
    128
}

fn default_aac_bitrate_kbps() -> u32 {
    128
}

fn default_opus_bitrate_kbps() -> u32 {
    96
}

fn default_max_concurrent_requests() -> usize {
    env_parsed("MAX_CONCURRENT_REQUESTS", 100)
}

fn default_worker_socket() -> PathBuf {
    env_string("VOCALIS_WORKER_SOCKET")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/tmp/vocalis_speech_worker.sock"))
}

fn default_worker_command() -> String {
    env_string("VOCALIS_WORKER_COMMAND")
        .unwrap_or_else(|| "python3 scripts/speech_worker.py".to_string())
}

fn default_worker_start_timeout_secs() -> u64 {
    30
}
