//! Framed-serial acquisition from a front-end microcontroller.
//!
//! Frame synchronization is a sliding 12-byte window matched against
//! `SOFR`/`EOFR` markers, little-endian 16-bit fields, with the 32-bit
//! timestamp reconstructed as `(stampB << 16) | stampA`. Two historical
//! frame formats are recognized; which one a given
//! deployment speaks is a firmware-revision fact, not a core-algorithm
//! concern, so both live behind the same `FramedSerialSource` selected by
//! [`FrameFormat`].

use std::collections::VecDeque;
use std::path::PathBuf;

use crate::error::AcquisitionError;

use super::{Sample, SampleSource};

/// Current frame format: `SOFR=0x0AAF | p0 | p1 | stampA | stampB | EOFR=0xF550`.
const SOFR: u16 = 0x0AAF;
const EOFR: u16 = 0xF550;

/// Older per-channel frame tags, little-endian 32-bit words, trailing
/// `0xFF00`.
const LEGACY_TAG_CH0: u32 = 0xFFAAAA00;
const LEGACY_TAG_CH1: u32 = 0xFF555500;
const LEGACY_TAG_HEARTBEAT: u32 = 0xFFA5A500;
const LEGACY_TRAILER: u16 = 0xFF00;

const WINDOW_LEN: usize = 12;

/// Which of the two historical frame encodings this serial link speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    /// `SOFR | p0 | p1 | stampA | stampB | EOFR`, one combined frame per sample.
    Combined,
    /// Per-channel tagged frames with a heartbeat; p0/p1 arrive as separate
    /// frames and are paired up before a sample can be yielded.
    LegacyPerChannel,
}

/// Reads raw bytes from a 115200 8N1 serial link and reassembles frames via
/// a sliding 12-byte window. The actual byte source (a serial-port read
/// loop) is out of scope; this type owns only the framing logic and is fed
/// bytes through [`FramedSerialSource::push_byte`] so it is independently
/// testable against a recorded byte stream.
pub struct FramedSerialSource {
    format: FrameFormat,
    window: VecDeque<u8>,
    pending_p0: Option<u16>,
    pending_p1: Option<u16>,
    pending: VecDeque<Sample>,
}

impl FramedSerialSource {
    /// Open the underlying serial port. Fails fast on missing device or
    /// permission issues, the one fatal-at-startup case for this backend.
    pub fn open(path: &str, format: FrameFormat) -> Result<Self, AcquisitionError> {
        std::fs::metadata(path).map_err(|source| AcquisitionError::SerialPortUnavailable {
            path: PathBuf::from(path),
            source,
        })?;
        tracing::info!(path, ?format, "framed-serial source opened");
        Ok(Self::new(format))
    }

    /// Construct directly from a format, for testing against byte streams
    /// without a real serial device.
    pub fn new(format: FrameFormat) -> Self {
        Self {
            format,
            window: VecDeque::with_capacity(WINDOW_LEN),
            pending_p0: None,
            pending_p1: None,
            pending: VecDeque::new(),
        }
    }

    /// Shift one byte into the sliding window and attempt a frame match.
    /// Matched frames enqueue a [`Sample`]; unmatched bytes simply slide the
    /// window by one with no error — a malformed frame is skipped, not fatal.
    pub fn push_byte(&mut self, byte: u8) {
        self.window.push_back(byte);
        if self.window.len() > WINDOW_LEN {
            self.window.pop_front();
        }
        if self.window.len() < WINDOW_LEN {
            return;
        }

        match self.format {
            FrameFormat::Combined => self.try_match_combined(),
            FrameFormat::LegacyPerChannel => self.try_match_legacy(),
        }
    }

    fn try_match_combined(&mut self) {
        let w: Vec<u8> = self.window.iter().copied().collect();
        let sofr = le_u16(&w[0..2]);
        let eofr = le_u16(&w[10..12]);
        if sofr != SOFR || eofr != EOFR {
            return;
        }
        let p0 = le_u16(&w[2..4]);
        let p1 = le_u16(&w[4..6]);
        let stamp_a = le_u16(&w[6..8]);
        let stamp_b = le_u16(&w[8..10]);
        let t_ms = ((stamp_b as u32) << 16 | stamp_a as u32) as u64;
        self.pending.push_back(Sample { p0, p1, t_ms });
        self.window.clear();
    }

    fn try_match_legacy(&mut self) {
        let w: Vec<u8> = self.window.iter().copied().collect();
        let tag = le_u32(&w[0..4]);
        let trailer = le_u16(&w[10..12]);
        if trailer != LEGACY_TRAILER {
            return;
        }
        match tag {
            LEGACY_TAG_CH0 => {
                self.pending_p0 = Some(le_u16(&w[4..6]));
                self.window.clear();
            }
            LEGACY_TAG_CH1 => {
                self.pending_p1 = Some(le_u16(&w[4..6]));
                self.window.clear();
            }
            LEGACY_TAG_HEARTBEAT => {
                // Heartbeat carries no sample data; just resets the window.
                self.window.clear();
            }
            _ => return,
        }
        if let (Some(p0), Some(p1)) = (self.pending_p0, self.pending_p1) {
            let t_ms = le_u32(&w[6..10]) as u64;
            self.pending.push_back(Sample { p0, p1, t_ms });
            self.pending_p0 = None;
            self.pending_p1 = None;
        }
    }
}

fn le_u16(bytes: &[u8]) -> u16 {
    u16::from_le_bytes([bytes[0], bytes[1]])
}

fn le_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

impl SampleSource for FramedSerialSource {
    fn next_sample(&mut self) -> Result<Option<Sample>, AcquisitionError> {
        Ok(self.pending.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn combined_frame(p0: u16, p1: u16, t_ms: u32) -> Vec<u8> {
        let stamp_a = (t_ms & 0xFFFF) as u16;
        let stamp_b = (t_ms >> 16) as u16;
        let mut bytes = Vec::with_capacity(12);
        bytes.extend_from_slice(&SOFR.to_le_bytes());
        bytes.extend_from_slice(&p0.to_le_bytes());
        bytes.extend_from_slice(&p1.to_le_bytes());
        bytes.extend_from_slice(&stamp_a.to_le_bytes());
        bytes.extend_from_slice(&stamp_b.to_le_bytes());
        bytes.extend_from_slice(&EOFR.to_le_bytes());
        bytes
    }

    #[test]
    fn combined_frame_decodes_to_one_sample() {
        let mut src = FramedSerialSource::new(FrameFormat::Combined);
        for b in combined_frame(0x0234, 0x0456, 0x0001_0002) {
            src.push_byte(b);
        }
        let sample = src.next_sample().unwrap().expect("one sample");
        assert_eq!(sample.p0, 0x0234);
        assert_eq!(sample.p1, 0x0456);
        assert_eq!(sample.t_ms, 0x0001_0002);
    }

    #[test]
    fn garbage_bytes_before_a_valid_frame_are_absorbed() {
        let mut src = FramedSerialSource::new(FrameFormat::Combined);
        for b in [0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x11] {
            src.push_byte(b);
        }
        for b in combined_frame(0x0100, 0x0200, 42) {
            src.push_byte(b);
        }
        let sample = src.next_sample().unwrap().expect("frame found after garbage");
        assert_eq!(sample.p0, 0x0100);
        assert_eq!(sample.t_ms, 42);
    }

    #[test]
    fn pure_garbage_yields_no_sample() {
        let mut src = FramedSerialSource::new(FrameFormat::Combined);
        for b in 0u8..=200 {
            src.push_byte(b);
        }
        assert!(src.next_sample().unwrap().is_none());
    }

    fn legacy_frame(tag: u32, payload: u16, stamp: u32) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(12);
        bytes.extend_from_slice(&tag.to_le_bytes());
        bytes.extend_from_slice(&payload.to_le_bytes());
        bytes.extend_from_slice(&stamp.to_le_bytes());
        bytes.extend_from_slice(&LEGACY_TRAILER.to_le_bytes());
        bytes
    }

    #[test]
    fn legacy_per_channel_pairs_across_two_frames() {
        let mut src = FramedSerialSource::new(FrameFormat::LegacyPerChannel);
        for b in legacy_frame(LEGACY_TAG_CH0, 0x0111, 1000) {
            src.push_byte(b);
        }
        assert!(src.next_sample().unwrap().is_none());
        for b in legacy_frame(LEGACY_TAG_CH1, 0x0222, 1000) {
            src.push_byte(b);
        }
        let sample = src.next_sample().unwrap().expect("paired sample");
        assert_eq!(sample.p0, 0x0111);
        assert_eq!(sample.p1, 0x0222);
        assert_eq!(sample.t_ms, 1000);
    }

    #[test]
    fn legacy_heartbeat_produces_no_sample() {
        let mut src = FramedSerialSource::new(FrameFormat::LegacyPerChannel);
        for b in legacy_frame(LEGACY_TAG_HEARTBEAT, 0, 0) {
            src.push_byte(b);
        }
        assert!(src.next_sample().unwrap().is_none());
    }
}
