//! Per-hose hysteretic debounce state machine.
//!
//! Turns a noisy pressure trace from one pneumatic hose into a stream of
//! clean, debounced rising-edge timestamps. Two instances run in lockstep,
//! one per hose; see [`crate::pairing`] for how their output is combined.
//!
//! Key design: separate HIGH/LOW thresholds around an adaptive baseline give
//! hysteresis, and a consecutive-sample debounce count on both edges rejects
//! hose bounce without delaying the rising edge that marks the crossing.

/// Sensor glitch filter: readings outside this band never reach the state
/// machine, regardless of phase.
const SAMPLE_MIN: u16 = 0x0180;
const SAMPLE_MAX: u16 = 0x1000;

/// Hysteresis offsets from the running baseline.
const HIGH_OFFSET: u16 = 0x0C0;
const LOW_OFFSET: u16 = 0x020;

/// Consecutive qualifying samples required to confirm a transition.
const N_RISE: u32 = 20;
const N_FALL: u32 = 60;

/// Baseline EMA window: `avg <- (avg*(W-1) + pressure) / W`.
const BASELINE_WINDOW: f64 = 250.0;

/// Tunable detector parameters, overridable from configuration. Defaults
/// match the module constants above.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tuning {
    pub sample_min: u16,
    pub sample_max: u16,
    pub high_offset: u16,
    pub low_offset: u16,
    pub n_rise: u32,
    pub n_fall: u32,
    pub baseline_window: f64,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            sample_min: SAMPLE_MIN,
            sample_max: SAMPLE_MAX,
            high_offset: HIGH_OFFSET,
            low_offset: LOW_OFFSET,
            n_rise: N_RISE,
            n_fall: N_FALL,
            baseline_window: BASELINE_WINDOW,
        }
    }
}

/// Detector phase. `change_count` is meaningful only in the two `Changing*`
/// phases; it is always 0 in `Idle`/`Active` (data-model invariant).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    ChangingUp,
    Active,
    ChangingDown,
}

/// A detection event: the hose transitioned IDLE → ACTIVE at `t_ms`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub t_ms: u64,
}

/// One hose's state: baseline tracker + debounce state machine.
#[derive(Debug, Clone)]
pub struct Channel {
    average: f64,
    phase: Phase,
    change_count: u32,
    /// Timestamp of the most recent confirmed rising edge.
    detect_time: u64,
    /// A fresh, unpaired detection awaiting the pairing step.
    has_event: bool,
    tuning: Tuning,
}

impl Channel {
    /// Start a channel with `initial_pressure` as the seed baseline and
    /// default tuning.
    pub fn new(initial_pressure: u16) -> Self {
        Self::with_tuning(initial_pressure, Tuning::default())
    }

    /// Start a channel with `initial_pressure` as the seed baseline and
    /// caller-supplied tuning, e.g. loaded from configuration.
    pub fn with_tuning(initial_pressure: u16, tuning: Tuning) -> Self {
        Self {
            average: initial_pressure as f64,
            phase: Phase::Idle,
            change_count: 0,
            detect_time: 0,
            has_event: false,
            tuning,
        }
    }

    fn high(&self) -> f64 {
        self.average + self.tuning.high_offset as f64
    }

    fn low(&self) -> f64 {
        self.average + self.tuning.low_offset as f64
    }

    /// Feed one pressure sample at `t_ms`. Samples must arrive in
    /// nondecreasing `t_ms` order. Out-of-range readings are dropped before
    /// reaching the state machine.
    pub fn process_sample(&mut self, pressure: u16, t_ms: u64) {
        if pressure < self.tuning.sample_min || pressure > self.tuning.sample_max {
            return;
        }

        let p = pressure as f64;
        let high = self.high();
        let low = self.low();

        match self.phase {
            Phase::Idle => {
                if p >= high {
                    self.phase = Phase::ChangingUp;
                    self.change_count = 1;
                } else if p <= low {
                    self.update_baseline(p);
                }
                // otherwise: neutral zone, stay, no baseline update
            }

            Phase::ChangingUp => {
                if p >= high {
                    self.change_count += 1;
                    if self.change_count >= self.tuning.n_rise {
                        self.phase = Phase::Active;
                        self.detect_time = t_ms;
                        self.has_event = true;
                        self.change_count = 0;
                    }
                } else if p <= low {
                    self.phase = Phase::Idle;
                    self.change_count = 0;
                }
                // neutral zone: stay, change_count unchanged
            }

            Phase::Active => {
                if p <= low {
                    self.phase = Phase::ChangingDown;
                    self.change_count = 1;
                }
                // p >= high or neutral: stay (a fresh high cancels any pending fall)
            }

            Phase::ChangingDown => {
                if p <= low {
                    self.change_count += 1;
                    if self.change_count >= self.tuning.n_fall {
                        self.phase = Phase::Idle;
                        self.change_count = 0;
                    }
                } else if p >= high {
                    self.phase = Phase::Active;
                    self.change_count = 0;
                }
                // neutral zone: stay, change_count unchanged
            }
        }
    }

    /// Baseline only advances while `Idle` and no transition is pending —
    /// enforced by only ever being called from the `Idle` arm above.
    fn update_baseline(&mut self, pressure: f64) {
        let window = self.tuning.baseline_window;
        self.average = (self.average * (window - 1.0) + pressure) / window;
    }

    /// True if a fresh, unpaired detection is waiting.
    pub fn has_event(&self) -> bool {
        self.has_event
    }

    /// Timestamp of the pending detection, if any.
    pub fn detect_time(&self) -> u64 {
        self.detect_time
    }

    /// Consume the pending detection, clearing `has_event`.
    pub fn take_event(&mut self) -> Option<Detection> {
        if self.has_event {
            self.has_event = false;
            Some(Detection {
                t_ms: self.detect_time,
            })
        } else {
            None
        }
    }

    /// Discard a pending detection without pairing it (used for stale
    /// half-pair handling in the pairing step).
    pub fn discard_event(&mut self) {
        self.has_event = false;
    }

    #[cfg(test)]
    fn phase(&self) -> Phase {
        self.phase
    }

    #[cfg(test)]
    fn baseline(&self) -> f64 {
        self.average
    }
}
