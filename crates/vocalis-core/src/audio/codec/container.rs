//! Per-packet container framing for codec output.
//!
//! FFmpeg hands back bare codec packets; these helpers wrap them so that
//! every emitted chunk is playable as a byte stream on its own.

/// Ogg CRC-32 (polynomial 0x04c11db7, no reflection, zero init).
fn ogg_crc32(data: &[u8]) -> u32 {
    let mut crc = 0u32;
    for &byte in data {
        crc ^= (byte as u32) << 24;
        for _ in 0..8 {
            crc = if crc & 0x8000_0000 != 0 {
                (crc << 1) ^ 0x04c1_1db7
            } else {
                crc << 1
            };
        }
    }
    crc
}

const OGG_BOS: u8 = 0x02;
const OGG_EOS: u8 = 0x04;

/// Writes an Opus logical bitstream one packet per page.
pub(crate) struct OggOpusWriter {
    serial: u32,
    sequence: u32,
    granule: i64,
    pre_skip: i64,
    granule_scale: i64,
    sample_rate: i64,
}

impl OggOpusWriter {
    pub(crate) fn new(serial: u32, sample_rate: u32) -> Self {
        Self {
            serial,
            sequence: 0,
            granule: 0,
            pre_skip: 0,
            // Ogg Opus granule positions always count 48 kHz samples.
            granule_scale: 48_000,
            sample_rate: sample_rate.max(1) as i64,
        }
    }

    /// Take the pre-skip (little-endian u16 at offset 10 of `OpusHead`)
    /// that offsets every granule position.
    pub(crate) fn read_pre_skip(&mut self, opus_head: &[u8]) {
        if let Some(bytes) = opus_head.get(10..12) {
            self.pre_skip = u16::from_le_bytes([bytes[0], bytes[1]]) as i64;
        }
    }

    /// Identification and comment header pages.
    pub(crate) fn header_pages(&mut self, opus_head: &[u8]) -> Vec<u8> {
        self.read_pre_skip(opus_head);
        let mut out = self.page(opus_head, OGG_BOS, 0);

        let vendor = b"vocalis";
        let mut tags = Vec::with_capacity(8 + 4 + vendor.len() + 4);
        tags.extend_from_slice(b"OpusTags");
        tags.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
        tags.extend_from_slice(vendor);
        tags.extend_from_slice(&0u32.to_le_bytes());
        out.extend(self.page(&tags, 0, 0));
        out
    }

    /// Page for one audio packet lasting `duration` samples at the input rate.
    pub(crate) fn audio_page(&mut self, packet: &[u8], duration: i64, last: bool) -> Vec<u8> {
        self.granule += duration.max(0) * self.granule_scale / self.sample_rate;
        let flags = if last { OGG_EOS } else { 0 };
        self.page(packet, flags, self.pre_skip + self.granule)
    }

    /// Empty end-of-stream page, used when the codec had nothing left to flush.
    pub(crate) fn end_page(&mut self) -> Vec<u8> {
        self.page(&[], OGG_EOS, self.pre_skip + self.granule)
    }

    fn page(&mut self, packet: &[u8], flags: u8, granule: i64) -> Vec<u8> {
        let mut lacing = vec![255u8; packet.len() / 255];
        lacing.push((packet.len() % 255) as u8);
        if packet.is_empty() {
            lacing.clear();
        }

        let mut page = Vec::with_capacity(27 + lacing.len() + packet.len());
        page.extend_from_slice(b"OggS");
        page.push(0);
        page.push(flags);
        page.extend_from_slice(&granule.to_le_bytes());
        page.extend_from_slice(&self.serial.to_le_bytes());
        page.extend_from_slice(&self.sequence.to_le_bytes());
        page.extend_from_slice(&0u32.to_le_bytes());
        page.push(lacing.len() as u8);
        page.extend_from_slice(&lacing);
        page.extend_from_slice(packet);

        let crc = ogg_crc32(&page);
        page[22..26].copy_from_slice(&crc.to_le_bytes());
        self.sequence += 1;
        page
    }
}

const ADTS_SAMPLE_RATES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// Prefix a raw AAC-LC mono packet with its 7-byte ADTS header.
pub(crate) fn adts_frame(packet: &[u8], sample_rate: u32) -> Vec<u8> {
    let freq_index = ADTS_SAMPLE_RATES
        .iter()
        .position(|&r| r == sample_rate)
        .unwrap_or(6) as u8;
    let profile = 1u8; // AAC LC (object type 2) minus one
    let channels = 1u8;
    let frame_len = (packet.len() + 7) as u16;

    let mut out = Vec::with_capacity(frame_len as usize);
    out.push(0xff);
    out.push(0xf1); // MPEG-4, layer 0, no CRC
    out.push((profile << 6) | (freq_index << 2) | (channels >> 2));
    out.push(((channels & 0x3) << 6) | ((frame_len >> 11) as u8 & 0x3));
    out.push((frame_len >> 3) as u8);
    out.push((((frame_len & 0x7) as u8) << 5) | 0x1f);
    out.push(0xfc);
    out.extend_from_slice(packet);
    out
}

/// `fLaC` marker followed by the STREAMINFO block as the only metadata block.
pub(crate) fn flac_stream_header(streaminfo: &[u8]) -> Vec<u8> {
    let len = streaminfo.len() as u32;
    let mut out = Vec::with_capacity(8 + streaminfo.len());
    out.extend_from_slice(b"fLaC");
    out.push(0x80); // last metadata block, type 0 (STREAMINFO)
    out.extend_from_slice(&len.to_be_bytes()[1..]);
    out.extend_from_slice(streaminfo);
    out
}
