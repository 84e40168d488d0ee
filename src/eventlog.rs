//! Fixed-column event log: the on-disk contract between the live pairing
//! pipeline and the daily aggregator. Lines are padded to fixed column
//! offsets rather than delimited, so the writer and reader must agree
//! exactly on column positions.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

use crate::aggregator::RawEvent;
use crate::pairing::{Direction, VehicleEvent};

/// Column offsets: epoch seconds at 0, speed at 34, direction character at 45.
const COL_SPEED: usize = 34;
const COL_DIRECTION: usize = 45;

/// Format one vehicle event as a fixed-offset line, padding the epoch-second
/// field so the speed and direction columns always land at [`COL_SPEED`] and
/// [`COL_DIRECTION`].
pub fn format_line(ev: &VehicleEvent) -> String {
    let dir_char = match ev.direction {
        Direction::Up => 'U',
        Direction::Down => 'D',
    };
    let epoch_s = ev.t_ms / 1000;
    let prefix = format!("{epoch_s}");
    let speed = format!("{:.1}", ev.speed_mph);

    let mut line = String::with_capacity(64);
    line.push_str(&prefix);
    pad_to(&mut line, COL_SPEED);
    line.push_str(&speed);
    pad_to(&mut line, COL_DIRECTION);
    line.push(dir_char);
    line
}

fn pad_to(line: &mut String, col: usize) {
    while line.len() < col {
        line.push(' ');
    }
}

/// Append-only, flush-after-every-write log writer. Rolls to a new file path
/// only when the caller asks it to (at local midnight in `main`); this type
/// itself just owns one open file handle.
pub struct EventLogWriter {
    file: File,
}

impl EventLogWriter {
    pub fn create_or_append(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file })
    }

    pub fn write_event(&mut self, ev: &VehicleEvent) -> io::Result<()> {
        let mut line = format_line(ev);
        line.push('\n');
        self.file.write_all(line.as_bytes())?;
        self.file.flush()
    }
}

/// Parse one event-log line at the fixed column offsets. Returns `None` on
/// any malformed line so the caller can skip it rather than abort.
fn parse_line(line: &str) -> Option<RawEvent> {
    let epoch_s: i64 = line.split_whitespace().next()?.parse().ok()?;

    let speed_field = line.get(COL_SPEED..COL_DIRECTION)?;
    let speed_mph: f64 = speed_field.trim().parse().ok()?;

    let dir_char = line.as_bytes().get(COL_DIRECTION).copied()?;
    let direction = if dir_char == b'U' {
        Direction::Up
    } else {
        Direction::Down
    };

    Some(RawEvent {
        epoch_s,
        speed_mph,
        direction,
    })
}

/// Read every well-formed event from a log file, in file order, skipping
/// malformed lines. Used by the aggregator binary.
pub fn read_events(path: &Path) -> io::Result<Vec<RawEvent>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut events = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if let Some(ev) = parse_line(&line) {
            events.push(ev);
        }
        // malformed lines are silently skipped
    }
    Ok(events)
}

/// Derive the report label from a log filename's embedded date substring,
/// starting at position 13.
pub fn date_label_from_filename(filename: &str) -> &str {
    filename.get(13..).unwrap_or(filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_then_parse_round_trips() {
        let ev = VehicleEvent {
            t_ms: 1_700_000_123_000,
            speed_mph: 12.5,
            direction: Direction::Up,
            wheelbase_ft: Some(7.2),
        };
        let line = format_line(&ev);
        assert_eq!(line.as_bytes()[COL_DIRECTION], b'U');

        let parsed = parse_line(&line).expect("parses");
        assert_eq!(parsed.epoch_s, 1_700_000_123);
        assert!((parsed.speed_mph - 12.5).abs() < 1e-9);
        assert_eq!(parsed.direction, Direction::Up);
    }

    #[test]
    fn downhill_direction_round_trips() {
        let ev = VehicleEvent {
            t_ms: 5000,
            speed_mph: 30.0,
            direction: Direction::Down,
            wheelbase_ft: None,
        };
        let line = format_line(&ev);
        let parsed = parse_line(&line).expect("parses");
        assert_eq!(parsed.direction, Direction::Down);
    }

    #[test]
    fn malformed_line_is_skipped_not_fatal() {
        assert!(parse_line("not a valid event log line at all").is_none());
        assert!(parse_line("").is_none());
    }

    #[test]
    fn date_label_uses_position_13() {
        assert_eq!(date_label_from_filename("traffic_log_2024-03-01.txt"), "024-03-01.txt");
    }
}
