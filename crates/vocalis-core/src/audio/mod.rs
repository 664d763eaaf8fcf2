//! Audio formats, PCM quantization and per-format streaming encoders.

mod encoder;
mod wav;

#[cfg(feature = "ffmpeg")]
mod codec;

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

pub use encoder::AudioEncoder;
pub use wav::{streaming_wav_header, WAV_HEADER_LEN};

/// Response formats the encoder layer can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioFormat {
    Pcm,
    Wav,
    Mp3,
    Aac,
    Opus,
    Flac,
}

impl AudioFormat {
    pub const ALL: [AudioFormat; 6] = [
        AudioFormat::Mp3,
        AudioFormat::Opus,
        AudioFormat::Aac,
        AudioFormat::Flac,
        AudioFormat::Wav,
        AudioFormat::Pcm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFormat::Pcm => "pcm",
            AudioFormat::Wav => "wav",
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Aac => "aac",
            AudioFormat::Opus => "opus",
            AudioFormat::Flac => "flac",
        }
    }

    /// Media type used for chunked-audio and bulk responses.
    pub fn content_type(&self) -> &'static str {
        match self {
            AudioFormat::Pcm => "audio/pcm",
            AudioFormat::Wav => "audio/wav",
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::Aac => "audio/aac",
            AudioFormat::Opus => "audio/ogg",
            AudioFormat::Flac => "audio/flac",
        }
    }

    /// Whether the format goes through a packet codec rather than raw PCM.
    pub fn is_compressed(&self) -> bool {
        !matches!(self, AudioFormat::Pcm | AudioFormat::Wav)
    }

    pub fn supported_names() -> String {
        Self::ALL
            .iter()
            .map(|f| f.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AudioFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pcm" => Ok(AudioFormat::Pcm),
            "wav" => Ok(AudioFormat::Wav),
            "mp3" => Ok(AudioFormat::Mp3),
            "aac" => Ok(AudioFormat::Aac),
            "opus" => Ok(AudioFormat::Opus),
            "flac" => Ok(AudioFormat::Flac),
            _ => Err(Error::Configuration(format!(
                "Unsupported audio format: {}",
                s
            ))),
        }
    }
}

/// Codec parameters shared by all encoders of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderSettings {
    pub mp3_bitrate_kbps: u32,
    pub aac_bitrate_kbps: u32,
    pub opus_bitrate_kbps: u32,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            mp3_bitrate_kbps: 128,
            aac_bitrate_kbps: 128,
            opus_bitrate_kbps: 96,
        }
    }
}

/// Quantize float samples in [-1.0, 1.0] to signed 16-bit PCM.
///
/// `round(clamp(sample * 32767, -32768, 32767))`; non-finite samples become silence.
pub fn quantize_pcm16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| {
            if !s.is_finite() {
                return 0;
            }
            (s * 32767.0).clamp(-32768.0, 32767.0).round() as i16
        })
        .collect()
}

/// Little-endian byte layout of quantized samples.
pub(crate) fn pcm16_le_bytes(samples: &[f32]) -> Vec<u8> {
    let pcm = quantize_pcm16(samples);
    let mut out = Vec::with_capacity(pcm.len() * 2);
    for sample in pcm {
        out.extend_from_slice(&sample.to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_formats_case_insensitively() {
        assert_eq!("WAV".parse::<AudioFormat>().unwrap(), AudioFormat::Wav);
        assert_eq!(" pcm ".parse::<AudioFormat>().unwrap(), AudioFormat::Pcm);
        assert_eq!("opus".parse::<AudioFormat>().unwrap(), AudioFormat::Opus);
    }

    #[test]
    fn unknown_format_is_a_configuration_error() {
        let err = "ogg_vorbis".parse::<AudioFormat>().unwrap_err();
        assert!(matches!(err, Error::Configuration(ref m) if m.contains("ogg_vorbis")));
    }

    #[test]
    fn content_types_follow_wire_contract() {
        assert_eq!(AudioFormat::Mp3.content_type(), "audio/mpeg");
        assert_eq!(AudioFormat::Opus.content_type(), "audio/ogg");
        assert_eq!(AudioFormat::Pcm.content_type(), "audio/pcm");
    }

    #[test]
    fn quantization_rounds_and_clamps() {
        let pcm = quantize_pcm16(&[0.0, 1.0, -1.0, 1.5, -1.5, 0.5, f32::NAN, f32::INFINITY]);
        assert_eq!(pcm, vec![0, 32767, -32767, 32767, -32768, 16384, 0, 0]);
    }

    #[test]
    fn pcm_bytes_are_little_endian() {
        let bytes = pcm16_le_bytes(&[1.0, -1.0]);
        assert_eq!(bytes, vec![0xff, 0x7f, 0x01, 0x80]);
    }
}
