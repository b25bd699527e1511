//! The clock seam that all wall-time computation flows through.
//!
//! Every phase timer in the engine is derived from `now - phase_started_at`
//! rather than from decremented counters, which makes tick processing
//! idempotent and tolerant of missed or duplicated ticks. Routing `now`
//! through the [`Clock`] trait keeps that arithmetic testable without
//! sleeping: production code uses [`SystemClock`], tests use [`ManualClock`].

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Mutex;
use std::time::Duration;

/// A source of the current wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The real wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
///
/// Lets tests drive phase timers deterministically: freeze it to assert
/// idempotence, step it to cross a phase boundary.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn starting_at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Moves the clock forward by `step`.
    pub fn advance(&self, step: Duration) {
        let step = ChronoDuration::from_std(step).expect("clock step out of range");
        let mut now = self.now.lock().expect("manual clock poisoned");
        *now = *now + step;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("manual clock poisoned")
    }
}

/// Fractional seconds elapsed between two instants, never negative.
pub fn secs_since(earlier: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let millis = (now - earlier).num_milliseconds();
    (millis.max(0) as f64) / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances_in_steps() {
        let start = Utc::now();
        let clock = ManualClock::starting_at(start);
        assert_eq!(clock.now(), start);

        clock.advance(Duration::from_millis(2500));
        assert!((secs_since(start, clock.now()) - 2.5).abs() < 1e-9);
    }

    #[test]
    fn secs_since_clamps_negative_spans() {
        let start = Utc::now();
        let earlier = start - ChronoDuration::seconds(5);
        assert_eq!(secs_since(start, earlier), 0.0);
    }
}
