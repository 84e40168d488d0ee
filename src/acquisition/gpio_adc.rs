//! Direct ADC acquisition over bit-banged GPIO lines to an MCP3202.
//!
//! The bit-banged SPI-like protocol itself is out of scope: this module owns
//! only the construction-time availability check and the shared monotonic
//! clock; the actual two-channel read is a single call into the platform
//! GPIO library and is elided as the seam a real backend fills in.

use std::time::Instant;

use crate::error::AcquisitionError;

use super::{Sample, SampleSource};

/// Acquires samples from an MCP3202 over a named GPIO chip (e.g.
/// `/dev/gpiochip0`) using bit-banged SPI-like reads.
pub struct GpioAdcSource {
    #[allow(dead_code)]
    chip: String,
    start: Instant,
}

impl GpioAdcSource {
    /// Open the GPIO chip. Fails fast if the device node is missing or the
    /// process lacks permission, the one fatal-at-startup case for this
    /// backend.
    pub fn open(chip: &str) -> Result<Self, AcquisitionError> {
        std::fs::metadata(chip).map_err(|source| AcquisitionError::GpioUnavailable {
            chip: chip.to_string(),
            source,
        })?;
        tracing::info!(chip, "GPIO/ADC source opened");
        Ok(Self {
            chip: chip.to_string(),
            start: Instant::now(),
        })
    }

    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Read one (p0, p1) pair from the MCP3202's two single-ended channels.
    /// The actual bit-banged transfer is hardware-specific and out of scope;
    /// this is the seam a real GPIO backend would fill in.
    fn read_raw(&mut self) -> (u16, u16) {
        (0, 0)
    }
}

impl SampleSource for GpioAdcSource {
    fn next_sample(&mut self) -> Result<Option<Sample>, AcquisitionError> {
        let (p0, p1) = self.read_raw();
        let t_ms = self.now_ms();
        Ok(Some(Sample { p0, p1, t_ms }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_fails_fast_on_missing_device() {
        let err = GpioAdcSource::open("/nonexistent/gpiochip99");
        assert!(matches!(err, Err(AcquisitionError::GpioUnavailable { .. })));
    }
}
