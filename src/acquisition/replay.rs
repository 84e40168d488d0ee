//! Replay acquisition from a recorded sample log: `p0 p1 t_ms` hex fields,
//! one sample per line. The first line seeds the initial baseline rather
//! than being treated as a sample; the timer-wrap bias correction is applied
//! to every subsequent raw timestamp below the documented threshold so that
//! replay reproduces a live run's event output exactly.

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::PathBuf;

use crate::error::AcquisitionError;

use super::{Sample, SampleSource};

/// Below this raw value a timestamp has wrapped and needs the bias applied.
const WRAP_THRESHOLD: u64 = 0x1_0000_0000_00;
/// Correction added to a wrapped timestamp.
const WRAP_BIAS: u64 = 0x1_6100_0000_00;

pub struct ReplaySource {
    lines: Lines<BufReader<File>>,
    /// The first line's sample, held here until the caller retrieves it via
    /// [`ReplaySource::seed`]. Not yielded by `next_sample`.
    seed: Sample,
}

impl ReplaySource {
    /// Open a sample-log file and read its first line as the baseline seed,
    /// retrievable via [`ReplaySource::seed`] without consuming it as a
    /// regular sample. An empty file is rejected up front since there is no
    /// baseline to seed from.
    pub fn open(path: &str) -> Result<Self, AcquisitionError> {
        let file = File::open(path).map_err(|source| AcquisitionError::ReplayFileUnavailable {
            path: PathBuf::from(path),
            source,
        })?;
        let mut lines = BufReader::new(file).lines();

        let first = lines
            .next()
            .ok_or_else(|| AcquisitionError::ReplayFileEmpty {
                path: PathBuf::from(path),
            })?
            .map_err(|source| AcquisitionError::ReplayFileUnavailable {
                path: PathBuf::from(path),
                source,
            })?;
        let seed = parse_sample_line(&first).ok_or_else(|| AcquisitionError::ReplayFileEmpty {
            path: PathBuf::from(path),
        })?;

        tracing::info!(path, "replay source opened");
        Ok(Self { lines, seed })
    }

    /// The baseline `(p0, p1)` from the file's first line, to seed the
    /// detector before any `next_sample()` call is fed to it.
    pub fn seed(&self) -> Sample {
        self.seed
    }

    /// Build directly from an in-memory line iterator, for testing without a
    /// real file on disk.
    #[cfg(test)]
    fn from_str(contents: &str) -> Result<ReplayLines, AcquisitionError> {
        let mut lines = contents.lines().map(|s| Ok(s.to_string()));
        let first = lines.next().ok_or_else(|| AcquisitionError::ReplayFileEmpty {
            path: PathBuf::from("<memory>"),
        })??;
        let seed = parse_sample_line(&first).ok_or_else(|| AcquisitionError::ReplayFileEmpty {
            path: PathBuf::from("<memory>"),
        })?;
        Ok(ReplayLines { lines: lines.collect::<Vec<_>>().into_iter(), seed })
    }
}

#[cfg(test)]
struct ReplayLines {
    lines: std::vec::IntoIter<Result<String, AcquisitionError>>,
    seed: Sample,
}

#[cfg(test)]
impl ReplayLines {
    fn seed(&self) -> Sample {
        self.seed
    }
}

#[cfg(test)]
impl SampleSource for ReplayLines {
    fn next_sample(&mut self) -> Result<Option<Sample>, AcquisitionError> {
        for line in self.lines.by_ref() {
            let line = line?;
            if let Some(sample) = parse_sample_line(&line) {
                return Ok(Some(sample));
            }
            // malformed replay lines are skipped, not fatal
        }
        Ok(None)
    }
}

/// Parse one `p0 p1 t_ms` hex-field line, applying the timer-wrap bias.
fn parse_sample_line(line: &str) -> Option<Sample> {
    let mut fields = line.split_whitespace();
    let p0 = u16::from_str_radix(fields.next()?, 16).ok()?;
    let p1 = u16::from_str_radix(fields.next()?, 16).ok()?;
    let raw_t = u64::from_str_radix(fields.next()?, 16).ok()?;
    let t_ms = if raw_t < WRAP_THRESHOLD {
        raw_t + WRAP_BIAS
    } else {
        raw_t
    };
    Some(Sample { p0, p1, t_ms })
}

impl SampleSource for ReplaySource {
    fn next_sample(&mut self) -> Result<Option<Sample>, AcquisitionError> {
        for line in self.lines.by_ref() {
            let line = line.map_err(|source| AcquisitionError::ReplayFileUnavailable {
                path: PathBuf::from("<open>"),
                source,
            })?;
            if let Some(sample) = parse_sample_line(&line) {
                return Ok(Some(sample));
            }
            // malformed replay lines are skipped, not fatal
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_hex_fields() {
        let sample = parse_sample_line("200 210 fffff").expect("parses");
        assert_eq!(sample.p0, 0x200);
        assert_eq!(sample.p1, 0x210);
        assert_eq!(sample.t_ms, 0xfffff);
    }

    #[test]
    fn applies_wrap_bias_below_threshold() {
        let sample = parse_sample_line("1 2 3").expect("parses");
        assert_eq!(sample.t_ms, 3 + WRAP_BIAS);
    }

    #[test]
    fn leaves_timestamps_above_threshold_untouched() {
        let raw = WRAP_THRESHOLD + 10;
        let line = format!("1 2 {raw:x}");
        let sample = parse_sample_line(&line).expect("parses");
        assert_eq!(sample.t_ms, raw);
    }

    #[test]
    fn malformed_line_returns_none() {
        assert!(parse_sample_line("not hex data").is_none());
        assert!(parse_sample_line("200").is_none());
    }

    #[test]
    fn first_line_seeds_baseline_and_is_not_yielded_as_a_sample() {
        let contents = "100 100 0\n200 210 5\n220 230 a\n";
        let src = ReplaySource::from_str(contents).expect("valid log");
        assert_eq!(src.seed().p0, 0x100);
        let mut src = src;
        let first = src.next_sample().unwrap().expect("second line");
        assert_eq!(first.p0, 0x200);
        let second = src.next_sample().unwrap().expect("third line");
        assert_eq!(second.p0, 0x220);
        assert!(src.next_sample().unwrap().is_none());
    }

    #[test]
    fn empty_log_is_rejected_at_open() {
        let err = ReplaySource::from_str("");
        assert!(matches!(err, Err(AcquisitionError::ReplayFileEmpty { .. })));
    }

    #[test]
    fn malformed_lines_are_skipped_mid_stream() {
        let contents = "100 100 0\n200 210 5\nGARBAGE\n220 230 a\n";
        let mut src = ReplaySource::from_str(contents).expect("valid log");
        assert!(src.next_sample().unwrap().is_some());
        let next = src.next_sample().unwrap().expect("skips garbage line");
        assert_eq!(next.p0, 0x220);
    }
}
