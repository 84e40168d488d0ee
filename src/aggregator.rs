//! Daily aggregator: coalesce, bin, and report a day's vehicle events.
//!
//! Bins live on an owned `DailyBins` value built incrementally by `ingest`,
//! and a `Report` is derived from it on demand rather than printed in place.

use chrono::{Datelike, Local, TimeZone, Weekday};
use serde::Serialize;

use crate::pairing::Direction;

/// One ingested vehicle event, as produced by [`crate::eventlog`] or directly
/// by [`crate::pairing::DetectorPair`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawEvent {
    pub epoch_s: i64,
    /// Non-negative; 0 means invalid/unknown.
    pub speed_mph: f64,
    pub direction: Direction,
}

/// Same-second double-report coalescing window.
const COALESCE_WINDOW_S: i64 = 3;
/// Speeds within this band are treated as agreeing enough to average rather
/// than being thrown out as a disagreement between two double-reports.
const COALESCE_SPEED_AGREEMENT_MPH: f64 = 5.0;

/// Speeds counted in per-bin stats must fall in this open interval.
const SPEED_STATS_MIN: f64 = 5.0;
const SPEED_STATS_MAX: f64 = 30.0;

const BINS_PER_DAY: usize = 24 * 4;
const BIN_SECONDS: i64 = 15 * 60;
const EARLY_BINS_END: usize = 6 * 4;
const LATE_BINS_START: usize = 22 * 4;

/// Running `(min, sum, max)` over speeds accepted into a bin.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SpeedStats {
    pub min: f64,
    pub sum: f64,
    pub max: f64,
    pub count: u32,
}

impl SpeedStats {
    fn accumulate(&mut self, speed: f64) {
        if self.count == 0 {
            self.min = speed;
            self.max = speed;
        } else {
            self.min = self.min.min(speed);
            self.max = self.max.max(speed);
        }
        self.sum += speed;
        self.count += 1;
    }

    pub fn average(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

/// One 15-minute bin.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Bin {
    pub up_count: u32,
    pub dn_count: u32,
    pub up_speed: SpeedStats,
    pub dn_speed: SpeedStats,
    /// Combined across both directions.
    pub overall_speed: SpeedStats,
}

impl Bin {
    fn record(&mut self, direction: Direction, speed_mph: f64) {
        match direction {
            Direction::Up => self.up_count += 1,
            Direction::Down => self.dn_count += 1,
        }
        if speed_mph > SPEED_STATS_MIN && speed_mph < SPEED_STATS_MAX {
            match direction {
                Direction::Up => self.up_speed.accumulate(speed_mph),
                Direction::Down => self.dn_speed.accumulate(speed_mph),
            }
            self.overall_speed.accumulate(speed_mph);
        }
    }

    fn merge(&mut self, other: &Bin) {
        self.up_count += other.up_count;
        self.dn_count += other.dn_count;
        for (dst, src) in [
            (&mut self.up_speed, &other.up_speed),
            (&mut self.dn_speed, &other.dn_speed),
            (&mut self.overall_speed, &other.overall_speed),
        ] {
            if src.count > 0 {
                if dst.count == 0 {
                    *dst = *src;
                } else {
                    dst.min = dst.min.min(src.min);
                    dst.max = dst.max.max(src.max);
                    dst.sum += src.sum;
                    dst.count += src.count;
                }
            }
        }
    }
}

/// One day's 96 bins, built up by [`DailyBins::ingest`].
#[derive(Debug, Clone)]
pub struct DailyBins {
    day_start_epoch_s: i64,
    bins: [Bin; BINS_PER_DAY],
    prev: Option<RawEvent>,
}

impl DailyBins {
    /// Start a fresh day with `day_start_epoch_s` at local 00:00.
    pub fn new(day_start_epoch_s: i64) -> Self {
        Self {
            day_start_epoch_s,
            bins: [Bin::default(); BINS_PER_DAY],
            prev: None,
        }
    }

    /// Derive `day_start_epoch_s` from the first event's timestamp,
    /// truncating to local midnight.
    pub fn day_start_for(epoch_s: i64) -> i64 {
        let dt = Local
            .timestamp_opt(epoch_s, 0)
            .single()
            .expect("epoch seconds in range");
        dt.date_naive()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_local_timezone(Local)
            .single()
            .expect("local midnight exists")
            .timestamp()
    }

    /// Feed one raw event, applying near-duplicate coalescing against the
    /// immediately preceding event before binning. Coalescing is
    /// order-insensitive for a same-second pair (the earlier of the two
    /// timestamps is always used for binning), but events should otherwise
    /// arrive in nondecreasing `epoch_s` order within the day; the caller
    /// (typically [`crate::eventlog::read_day`]) is responsible for sorting
    /// if the source does not already guarantee this.
    pub fn ingest(&mut self, ev: RawEvent) {
        if let Some(prev) = self.prev.take() {
            if prev.direction == ev.direction
                && (ev.epoch_s - prev.epoch_s).abs() <= COALESCE_WINDOW_S
            {
                let coalesced_speed = if (ev.speed_mph - prev.speed_mph).abs()
                    < COALESCE_SPEED_AGREEMENT_MPH
                {
                    (ev.speed_mph + prev.speed_mph) / 2.0
                } else {
                    0.0
                };
                let earlier = prev.epoch_s.min(ev.epoch_s);
                self.bin_mut(earlier).record(prev.direction, coalesced_speed);
                // Coalesced pair consumed; nothing carries forward.
                return;
            }
            self.bin_mut(prev.epoch_s).record(prev.direction, prev.speed_mph);
        }
        self.prev = Some(ev);
    }

    /// Flush a trailing un-coalesced event at end of day. Must be called
    /// exactly once after the last `ingest` call for the day.
    pub fn finish(mut self) -> Report {
        if let Some(prev) = self.prev.take() {
            self.bin_mut(prev.epoch_s).record(prev.direction, prev.speed_mph);
        }
        Report::from_bins(self.day_start_epoch_s, self.bins)
    }

    fn bin_mut(&mut self, epoch_s: i64) -> &mut Bin {
        let offset = (epoch_s - self.day_start_epoch_s).max(0);
        let idx = ((offset / BIN_SECONDS) as usize).min(BINS_PER_DAY - 1);
        &mut self.bins[idx]
    }
}

/// A finished day's report: 96 bins collapsed into early/day/late, plus
/// day-wide totals and speed stats.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub day_start_epoch_s: i64,
    pub weekday: String,
    /// `[0:00, 6:00)` collapsed into one bin.
    pub early: Bin,
    /// `[6:00, 22:00)`, one entry per quarter-hour (64 bins).
    pub daytime: Vec<Bin>,
    /// `[22:00, 24:00)` collapsed into one bin.
    pub late: Bin,
    pub total: Bin,
}

impl Report {
    fn from_bins(day_start_epoch_s: i64, bins: [Bin; BINS_PER_DAY]) -> Self {
        let mut early = Bin::default();
        for b in &bins[..EARLY_BINS_END] {
            early.merge(b);
        }

        let mut late = Bin::default();
        for b in &bins[LATE_BINS_START..] {
            late.merge(b);
        }

        let daytime: Vec<Bin> = bins[EARLY_BINS_END..LATE_BINS_START].to_vec();

        let mut total = Bin::default();
        for b in &bins {
            total.merge(b);
        }

        let weekday = weekday_name(day_start_epoch_s);

        Self {
            day_start_epoch_s,
            weekday,
            early,
            daytime,
            late,
            total,
        }
    }
}

fn weekday_name(epoch_s: i64) -> String {
    let dt = Local
        .timestamp_opt(epoch_s, 0)
        .single()
        .expect("epoch seconds in range");
    match dt.weekday() {
        Weekday::Sun => "Sunday",
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
    }
    .to_string()
}

/// Aggregate a full day's events in one call: ingest everything, then finish.
pub fn aggregate_day(events: impl IntoIterator<Item = RawEvent>) -> Option<Report> {
    let mut events = events.into_iter();
    let first = events.next()?;
    let mut bins = DailyBins::new(DailyBins::day_start_for(first.epoch_s));
    bins.ingest(first);
    for ev in events {
        bins.ingest(ev);
    }
    Some(bins.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn up(epoch_s: i64, speed: f64) -> RawEvent {
        RawEvent {
            epoch_s,
            speed_mph: speed,
            direction: Direction::Up,
        }
    }

    #[test]
    fn s5_coalesce_agreeing_speeds_averages() {
        let day_start = DailyBins::day_start_for(1_700_000_000);
        let mut bins = DailyBins::new(day_start);
        let t = day_start + 28_800;
        bins.ingest(up(t, 12.0));
        bins.ingest(up(t + 2, 13.0));
        let report = bins.finish();
        let bin = &report.daytime[(28_800 / BIN_SECONDS) as usize - EARLY_BINS_END];
        assert_eq!(bin.up_count, 1);
        assert_eq!(bin.up_speed.average(), Some(12.5));
    }

    #[test]
    fn s5_coalesce_disagreeing_speeds_zeroes_and_excludes() {
        let day_start = DailyBins::day_start_for(1_700_000_000);
        let mut bins = DailyBins::new(day_start);
        let t = day_start + 28_800;
        bins.ingest(up(t, 12.0));
        bins.ingest(up(t + 2, 20.0));
        let report = bins.finish();
        let idx = (28_800 / BIN_SECONDS) as usize - EARLY_BINS_END;
        let bin = &report.daytime[idx];
        assert_eq!(bin.up_count, 1);
        assert_eq!(bin.up_speed.count, 0);
    }

    #[test]
    fn non_coalescable_events_both_count() {
        let day_start = DailyBins::day_start_for(1_700_000_000);
        let mut bins = DailyBins::new(day_start);
        let t = day_start + 28_800;
        bins.ingest(up(t, 12.0));
        bins.ingest(up(t + 10, 13.0)); // outside the 3s window
        let report = bins.finish();
        let idx = (28_800 / BIN_SECONDS) as usize - EARLY_BINS_END;
        assert_eq!(report.daytime[idx].up_count, 2);
    }

    #[test]
    fn different_direction_never_coalesces() {
        let day_start = DailyBins::day_start_for(1_700_000_000);
        let mut bins = DailyBins::new(day_start);
        let t = day_start + 28_800;
        bins.ingest(up(t, 12.0));
        bins.ingest(RawEvent {
            epoch_s: t + 1,
            speed_mph: 12.0,
            direction: Direction::Down,
        });
        let report = bins.finish();
        let idx = (28_800 / BIN_SECONDS) as usize - EARLY_BINS_END;
        assert_eq!(report.daytime[idx].up_count, 1);
        assert_eq!(report.daytime[idx].dn_count, 1);
    }

    #[test]
    fn early_and_late_bins_collapse() {
        let day_start = DailyBins::day_start_for(1_700_000_000);
        let mut bins = DailyBins::new(day_start);
        bins.ingest(up(day_start + 60, 12.0)); // 00:01, early
        bins.ingest(up(day_start + 23 * 3600, 12.0)); // 23:00, late
        let report = bins.finish();
        assert_eq!(report.early.up_count, 1);
        assert_eq!(report.late.up_count, 1);
        assert_eq!(report.total.up_count, 2);
    }

    #[test]
    fn coalesce_round_trip_insensitive_to_reordering() {
        // merge_coalesce(events) -> bins -> totals must not depend on the
        // arrival order of a same-second coalescable pair.
        let day_start = DailyBins::day_start_for(1_700_000_000);
        let t = day_start + 28_800;

        let mut a = DailyBins::new(day_start);
        a.ingest(up(t, 12.0));
        a.ingest(up(t + 1, 13.0));
        let report_a = a.finish();

        let mut b = DailyBins::new(day_start);
        b.ingest(up(t + 1, 13.0));
        b.ingest(up(t, 12.0));
        let report_b = b.finish();

        assert_eq!(report_a.total.up_count, report_b.total.up_count);
    }
}
