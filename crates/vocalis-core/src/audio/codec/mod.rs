//! Compressed formats through FFmpeg encoders.
//!
//! Encoders are driven frame by frame; the packets they release are framed
//! by [`container`] so each emitted chunk is self-describing.

mod container;

use ffmpeg_next as ffmpeg;
use ffmpeg_next::format::sample::Type as SampleLayout;
use ffmpeg_next::format::Sample;
use tracing::debug;

use super::{AudioFormat, EncoderSettings};
use crate::error::{Error, Result};
use container::{adts_frame, flac_stream_header, OggOpusWriter};

/// Frame size used when the codec accepts variable-sized frames.
const VARIABLE_FRAME_SAMPLES: usize = 1024;

enum Framing {
    Mp3,
    Adts,
    Flac { header_sent: bool },
    Ogg { writer: OggOpusWriter, header_sent: bool },
}

pub(crate) struct CodecEncoder {
    encoder: ffmpeg::codec::encoder::audio::Encoder,
    sample_format: Sample,
    sample_rate: u32,
    frame_samples: usize,
    pending: Vec<i16>,
    pts: i64,
    framing: Framing,
}

impl CodecEncoder {
    pub(crate) fn new(format: AudioFormat, sample_rate: u32, settings: &EncoderSettings) -> Result<Self> {
        ffmpeg::init().map_err(|e| Error::Configuration(format!("FFmpeg init failed: {}", e)))?;

        let (codec, sample_format, bitrate_kbps, mut framing) = match format {
            AudioFormat::Mp3 => (
                ffmpeg::encoder::find_by_name("libmp3lame"),
                Sample::I16(SampleLayout::Planar),
                Some(settings.mp3_bitrate_kbps),
                Framing::Mp3,
            ),
            AudioFormat::Aac => (
                ffmpeg::encoder::find(ffmpeg::codec::Id::AAC),
                Sample::F32(SampleLayout::Planar),
                Some(settings.aac_bitrate_kbps),
                Framing::Adts,
            ),
            AudioFormat::Opus => (
                ffmpeg::encoder::find_by_name("libopus"),
                Sample::I16(SampleLayout::Packed),
                Some(settings.opus_bitrate_kbps),
                Framing::Ogg {
                    writer: OggOpusWriter::new(stream_serial(), sample_rate),
                    header_sent: false,
                },
            ),
            AudioFormat::Flac => (
                ffmpeg::encoder::find(ffmpeg::codec::Id::FLAC),
                Sample::I16(SampleLayout::Packed),
                None,
                Framing::Flac { header_sent: false },
            ),
            AudioFormat::Pcm | AudioFormat::Wav => {
                return Err(Error::Configuration(format!(
                    "{} is not a compressed format",
                    format
                )))
            }
        };

        let codec = codec.ok_or_else(|| {
            Error::Configuration(format!("No FFmpeg encoder available for {}", format))
        })?;

        let mut context = ffmpeg::codec::context::Context::new_with_codec(codec)
            .encoder()
            .audio()
            .map_err(|e| Error::Configuration(format!("{} encoder setup failed: {}", format, e)))?;
        context.set_rate(sample_rate as i32);
        context.set_channel_layout(ffmpeg::ChannelLayout::MONO);
        context.set_format(sample_format);
        context.set_time_base((1, sample_rate as i32));
        if let Some(kbps) = bitrate_kbps {
            context.set_bit_rate(kbps as usize * 1000);
        }

        let encoder = context
            .open_as(codec)
            .map_err(|e| Error::Configuration(format!("{} encoder open failed: {}", format, e)))?;

        if let Framing::Ogg { writer, .. } = &mut framing {
            // Pages can be released before the stream header is written.
            writer.read_pre_skip(&codec_extradata(&encoder));
        }

        let frame_samples = match encoder.frame_size() as usize {
            0 => VARIABLE_FRAME_SAMPLES,
            n => n,
        };
        debug!(
            "Opened {} codec: {} samples per frame, {:?}",
            format, frame_samples, sample_format
        );

        Ok(Self {
            encoder,
            sample_format,
            sample_rate,
            frame_samples,
            pending: Vec::new(),
            pts: 0,
            framing,
        })
    }

    /// Queue PCM, feed every complete frame and drain the packets released so far.
    pub(crate) fn encode(&mut self, pcm: &[i16]) -> Result<Vec<u8>> {
        self.pending.extend_from_slice(pcm);

        let mut out = Vec::new();
        while self.pending.len() >= self.frame_samples {
            let frame: Vec<i16> = self.pending.drain(..self.frame_samples).collect();
            self.send(&frame)?;
            out.extend(self.drain(false)?);
        }
        Ok(self.with_stream_header(out))
    }

    /// Pad and send the partial frame, signal end of stream and drain the rest.
    pub(crate) fn finish(&mut self) -> Result<Vec<u8>> {
        if !self.pending.is_empty() {
            let mut frame = std::mem::take(&mut self.pending);
            frame.resize(self.frame_samples, 0);
            self.send(&frame)?;
        }
        self.encoder
            .send_eof()
            .map_err(|e| Error::Synthesis(format!("Encoder flush failed: {}", e)))?;

        let out = self.drain(true)?;
        Ok(self.with_stream_header(out))
    }

    fn send(&mut self, samples: &[i16]) -> Result<()> {
        let mut frame = ffmpeg::util::frame::audio::Audio::new(
            self.sample_format,
            samples.len(),
            ffmpeg::ChannelLayout::MONO,
        );
        frame.set_rate(self.sample_rate);
        frame.set_pts(Some(self.pts));

        let bytes: Vec<u8> = match self.sample_format {
            Sample::F32(_) => samples
                .iter()
                .flat_map(|&s| (s as f32 / 32768.0).to_ne_bytes())
                .collect(),
            _ => samples.iter().flat_map(|&s| s.to_ne_bytes()).collect(),
        };
        frame.data_mut(0)[..bytes.len()].copy_from_slice(&bytes);

        self.encoder
            .send_frame(&frame)
            .map_err(|e| Error::Synthesis(format!("Encoder rejected frame: {}", e)))?;
        self.pts += samples.len() as i64;
        Ok(())
    }

    fn drain(&mut self, at_end: bool) -> Result<Vec<u8>> {
        let mut packets: Vec<(Vec<u8>, i64)> = Vec::new();
        let mut packet = ffmpeg::Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            if let Some(data) = packet.data() {
                packets.push((data.to_vec(), packet.duration()));
            }
        }

        let mut out = Vec::new();
        let count = packets.len();
        for (i, (data, duration)) in packets.into_iter().enumerate() {
            match &mut self.framing {
                Framing::Mp3 | Framing::Flac { .. } => out.extend_from_slice(&data),
                Framing::Adts => out.extend(adts_frame(&data, self.sample_rate)),
                Framing::Ogg { writer, .. } => {
                    let last = at_end && i + 1 == count;
                    out.extend(writer.audio_page(&data, duration, last));
                }
            }
        }

        if at_end && count == 0 {
            if let Framing::Ogg { writer, .. } = &mut self.framing {
                out.extend(writer.end_page());
            }
        }
        Ok(out)
    }

    /// Prepend codec stream headers to the first non-empty output.
    fn with_stream_header(&mut self, body: Vec<u8>) -> Vec<u8> {
        if body.is_empty() {
            return body;
        }
        let extradata = self.extradata();
        match &mut self.framing {
            Framing::Flac { header_sent } if !*header_sent => {
                *header_sent = true;
                let mut out = flac_stream_header(&extradata);
                out.extend(body);
                out
            }
            Framing::Ogg {
                writer,
                header_sent,
            } if !*header_sent => {
                *header_sent = true;
                let mut out = writer.header_pages(&extradata);
                out.extend(body);
                out
            }
            _ => body,
        }
    }

    fn extradata(&self) -> Vec<u8> {
        codec_extradata(&self.encoder)
    }
}

fn codec_extradata(encoder: &ffmpeg::codec::encoder::audio::Encoder) -> Vec<u8> {
    // SAFETY: the codec context is open and owned by `encoder`;
    // FFmpeg keeps `extradata_size` bytes valid for its lifetime.
    unsafe {
        let ctx = encoder.as_ptr();
        if (*ctx).extradata.is_null() || (*ctx).extradata_size <= 0 {
            return Vec::new();
        }
        std::slice::from_raw_parts((*ctx).extradata, (*ctx).extradata_size as usize).to_vec()
    }
}

fn stream_serial() -> u32 {
    use std::time::{SystemTime, UNIX_EPOCH};

    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos()
        .wrapping_mul(1103515245)
        .wrapping_add(12345)
}
