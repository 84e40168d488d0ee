//! Sample acquisition: swappable backends behind one `SampleSource` contract.
//! Each backend is fallible only at construction; once open, reads either
//! produce a sample or block/loop past malformed input without surfacing an
//! error.

mod framed_serial;
mod gpio_adc;
mod replay;

pub use framed_serial::{FrameFormat, FramedSerialSource};
pub use gpio_adc::GpioAdcSource;
pub use replay::ReplaySource;

use crate::error::AcquisitionError;

/// One pressure sample from both hoses at a shared timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub p0: u16,
    pub p1: u16,
    pub t_ms: u64,
}

/// Shared contract for everything that can supply `(p0, p1, t_ms)` tuples.
///
/// Implementations are fallible only at construction; `next_sample` itself
/// never surfaces a recoverable error. A malformed frame or a malformed
/// replay line is skipped internally and `next_sample` simply blocks (or
/// loops) until a valid sample is available or the source is exhausted.
pub trait SampleSource {
    /// Block until the next valid sample is available, or return `Ok(None)`
    /// once the source is exhausted (only meaningful for replay).
    fn next_sample(&mut self) -> Result<Option<Sample>, AcquisitionError>;
}

/// The configured acquisition backend, selected at startup.
pub enum AcquisitionSource {
    GpioAdc(GpioAdcSource),
    FramedSerial(FramedSerialSource),
    Replay(ReplaySource),
}

impl SampleSource for AcquisitionSource {
    fn next_sample(&mut self) -> Result<Option<Sample>, AcquisitionError> {
        match self {
            AcquisitionSource::GpioAdc(s) => s.next_sample(),
            AcquisitionSource::FramedSerial(s) => s.next_sample(),
            AcquisitionSource::Replay(s) => s.next_sample(),
        }
    }
}

impl AcquisitionSource {
    /// The sample to seed the detector's baseline with, before any
    /// `next_sample()` call is fed to it. Replay already set its baseline
    /// sample aside at `open` time (the file's first line) so it is returned
    /// here without consuming the first real sample; live backends have no
    /// such distinction, so their first reading doubles as the seed.
    pub fn seed_sample(&mut self) -> Result<Option<Sample>, AcquisitionError> {
        match self {
            AcquisitionSource::Replay(s) => Ok(Some(s.seed())),
            other => other.next_sample(),
        }
    }
}
