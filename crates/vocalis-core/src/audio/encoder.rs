//! Stateful per-session audio encoders.

use tracing::debug;

use super::{pcm16_le_bytes, streaming_wav_header, AudioFormat, EncoderSettings};
use crate::error::{Error, Result};

#[cfg(feature = "ffmpeg")]
use super::codec::CodecEncoder;

enum EncoderState {
    Pcm,
    Wav,
    #[cfg(feature = "ffmpeg")]
    Compressed(Box<CodecEncoder>),
}

/// Turns sample buffers into container/codec bytes without knowing the
/// total signal length up front.
///
/// One instance serves exactly one stream: `create_header` once, any number
/// of `encode_chunk` calls, then `finalize` once.
pub struct AudioEncoder {
    format: AudioFormat,
    sample_rate: u32,
    state: EncoderState,
    finalized: bool,
}

impl AudioEncoder {
    /// Construct the encoder for `format`.
    ///
    /// Fails with [`Error::Configuration`] when the format cannot be produced
    /// by this build.
    pub fn new(format: AudioFormat, sample_rate: u32, settings: &EncoderSettings) -> Result<Self> {
        if sample_rate == 0 {
            return Err(Error::Configuration(
                "Sample rate must be greater than zero".to_string(),
            ));
        }

        let state = match format {
            AudioFormat::Pcm => EncoderState::Pcm,
            AudioFormat::Wav => EncoderState::Wav,
            #[cfg(feature = "ffmpeg")]
            _ => EncoderState::Compressed(Box::new(CodecEncoder::new(
                format,
                sample_rate,
                settings,
            )?)),
            #[cfg(not(feature = "ffmpeg"))]
            _ => {
                let _ = settings;
                return Err(Error::Configuration(format!(
                    "Audio format '{}' requires the `ffmpeg` feature",
                    format
                )));
            }
        };

        debug!("Created {} encoder at {} Hz", format, sample_rate);

        Ok(Self {
            format,
            sample_rate,
            state,
            finalized: false,
        })
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn content_type(&self) -> &'static str {
        self.format.content_type()
    }

    /// Container header to emit before any audio data, if the format has one.
    pub fn create_header(&self) -> Option<Vec<u8>> {
        match self.state {
            EncoderState::Wav => Some(streaming_wav_header(self.sample_rate)),
            _ => None,
        }
    }

    /// Encode one buffer. An empty result means the codec is still buffering.
    pub fn encode_chunk(&mut self, samples: &[f32]) -> Result<Vec<u8>> {
        self.ensure_open()?;
        match &mut self.state {
            EncoderState::Pcm | EncoderState::Wav => Ok(pcm16_le_bytes(samples)),
            #[cfg(feature = "ffmpeg")]
            EncoderState::Compressed(codec) => {
                codec.encode(&super::quantize_pcm16(samples))
            }
        }
    }

    /// Flush buffered codec state. Raw PCM paths never have trailing bytes.
    pub fn finalize(&mut self) -> Result<Option<Vec<u8>>> {
        self.ensure_open()?;
        self.finalized = true;
        match &mut self.state {
            EncoderState::Pcm | EncoderState::Wav => Ok(None),
            #[cfg(feature = "ffmpeg")]
            EncoderState::Compressed(codec) => {
                let tail = codec.finish()?;
                Ok(if tail.is_empty() { None } else { Some(tail) })
            }
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Header + one chunk over the whole signal + trailer, as one blob.
    pub fn encode_all(mut self, samples: &[f32]) -> Result<Vec<u8>> {
        let mut out = self.create_header().unwrap_or_default();
        out.extend_from_slice(&self.encode_chunk(samples)?);
        if let Some(tail) = self.finalize()? {
            out.extend_from_slice(&tail);
        }
        Ok(out)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.finalized {
            return Err(Error::Synthesis(format!(
                "{} encoder already finalized",
                self.format
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for AudioEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioEncoder")
            .field("format", &self.format)
            .field("sample_rate", &self.sample_rate)
            .field("finalized", &self.finalized)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{quantize_pcm16, WAV_HEADER_LEN};
    use std::io::Cursor;

    fn encoder(format: AudioFormat) -> AudioEncoder {
        AudioEncoder::new(format, 24000, &EncoderSettings::default()).unwrap()
    }

    fn sine(len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (i as f32 * 440.0 * std::f32::consts::TAU / 24000.0).sin() * 0.8)
            .collect()
    }

    /// Fill in the length fields a streaming header leaves at zero.
    fn seal_wav(mut bytes: Vec<u8>) -> Vec<u8> {
        let data_len = (bytes.len() - WAV_HEADER_LEN) as u32;
        bytes[4..8].copy_from_slice(&(data_len + 36).to_le_bytes());
        bytes[40..44].copy_from_slice(&data_len.to_le_bytes());
        bytes
    }

    #[test]
    fn pcm_has_no_header_or_trailer() {
        let mut enc = encoder(AudioFormat::Pcm);
        assert!(enc.create_header().is_none());
        assert_eq!(enc.encode_chunk(&[0.25; 10]).unwrap().len(), 20);
        assert!(enc.finalize().unwrap().is_none());
    }

    #[test]
    fn wav_round_trips_through_a_standard_reader() {
        let signal = sine(2400);
        let mut enc = encoder(AudioFormat::Wav);
        let mut bytes = enc.create_header().unwrap();
        for chunk in signal.chunks(700) {
            bytes.extend(enc.encode_chunk(chunk).unwrap());
        }
        assert!(enc.finalize().unwrap().is_none());

        let reader = hound::WavReader::new(Cursor::new(seal_wav(bytes))).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 24000);
        assert_eq!(spec.bits_per_sample, 16);

        let decoded: Vec<i16> = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(decoded, quantize_pcm16(&signal));
        for (orig, back) in signal.iter().zip(&decoded) {
            assert!((orig - *back as f32 / 32767.0).abs() <= 1.0 / 32767.0);
        }
    }

    #[test]
    fn chunked_encoding_matches_single_pass() {
        let signal = sine(1000);
        let whole = encoder(AudioFormat::Pcm).encode_all(&signal).unwrap();

        let mut enc = encoder(AudioFormat::Pcm);
        let mut pieces = Vec::new();
        for chunk in signal.chunks(333) {
            pieces.extend(enc.encode_chunk(chunk).unwrap());
        }
        assert_eq!(pieces, whole);
    }

    #[test]
    fn encoder_refuses_work_after_finalize() {
        let mut enc = encoder(AudioFormat::Wav);
        enc.finalize().unwrap();
        assert!(enc.is_finalized());
        assert!(matches!(enc.encode_chunk(&[0.0]), Err(Error::Synthesis(_))));
        assert!(enc.finalize().is_err());
    }

    #[test]
    fn zero_sample_rate_is_rejected() {
        let err = AudioEncoder::new(AudioFormat::Pcm, 0, &EncoderSettings::default()).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[cfg(not(feature = "ffmpeg"))]
    #[test]
    fn compressed_formats_need_the_codec_feature() {
        for format in [AudioFormat::Mp3, AudioFormat::Aac, AudioFormat::Opus, AudioFormat::Flac] {
            let err = AudioEncoder::new(format, 24000, &EncoderSettings::default()).unwrap_err();
            assert!(matches!(err, Error::Configuration(ref m) if m.contains("ffmpeg")));
        }
    }
}
