//! Typed errors for the one category that is fatal at startup. Everything
//! else in the error taxonomy (sample rejection, stale half-pairs,
//! indeterminate speed, parse failures) is absorbed as plain control flow
//! inside the component that detects it and never becomes a `Result::Err` —
//! see `detector.rs`, `pairing.rs`, and `eventlog::read_events`.

use std::path::PathBuf;

/// Fatal acquisition-setup failure. The only error type the core pipeline
/// constructs; propagates all the way to `main`'s non-zero exit code.
#[derive(Debug, thiserror::Error)]
pub enum AcquisitionError {
    #[error("GPIO chip {chip} is not accessible: {source}")]
    GpioUnavailable {
        chip: String,
        #[source]
        source: std::io::Error,
    },

    #[error("serial port {path:?} could not be opened: {source}")]
    SerialPortUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("replay file {path:?} could not be opened: {source}")]
    ReplayFileUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("replay file {path:?} has no samples to seed the initial baseline")]
    ReplayFileEmpty { path: PathBuf },
}
