//! Fixed-period loop scheduling.
//!
//! The controller runs one iteration per period. `Ticker` only does the arithmetic against an
//! externally supplied `Instant`, so tests can drive it with a hand-moved clock instead of
//! sleeping.

use embassy_time::{Duration, Instant};
use serde::Serialize;

/// What the loop should do after finishing its work for one period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Sleep this long before the next iteration.
    Wait(Duration),
    /// The deadline already passed by this much; start the next iteration at once.
    Overrun(Duration),
}

/// Deadline tracker for a fixed period.
pub struct Ticker {
    period: Duration,
    deadline: Option<Instant>,
}

impl Ticker {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            deadline: None,
        }
    }

    #[inline]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Anchor the first deadline one period after `now`. Later calls are no-ops.
    pub fn arm(
        &mut self,
        now: Instant,
    ) {
        if self.deadline.is_none() {
            self.deadline = Some(now + self.period);
        }
    }

    /// Close the current period and work out how long to wait for the next one.
    ///
    /// On time, the deadline moves forward by exactly one period so the cadence does not
    /// drift. After an overrun the schedule is re-anchored at `now`.
    pub fn next(
        &mut self,
        now: Instant,
    ) -> Tick {
        let deadline = *self.deadline.get_or_insert(now + self.period);
        if now <= deadline {
            self.deadline = Some(deadline + self.period);
            Tick::Wait(deadline - now)
        } else {
            self.deadline = Some(now + self.period);
            Tick::Overrun(now - deadline)
        }
    }
}

/// Timing counters for the main loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoopStats {
    pub iterations: u64,
    /// Busy time of the most recent iteration (µs).
    pub last_busy_us: u64,
    pub max_busy_us: u64,
    pub overruns: u64,
}

impl LoopStats {
    pub fn record(
        &mut self,
        busy: Duration,
        tick: Tick,
    ) {
        let busy_us = busy.as_micros();
        self.iterations += 1;
        self.last_busy_us = busy_us;
        self.max_busy_us = self.max_busy_us.max(busy_us);
        if let Tick::Overrun(_) = tick {
            self.overruns += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ms: u64) -> Instant {
        Instant::from_millis(ms)
    }

    #[test]
    fn waits_out_the_rest_of_the_period() {
        let mut t = Ticker::new(Duration::from_millis(50));
        t.arm(at(0));
        assert_eq!(t.next(at(12)), Tick::Wait(Duration::from_millis(38)));
        // second period is anchored on the first deadline, not on when we woke up
        assert_eq!(t.next(at(61)), Tick::Wait(Duration::from_millis(39)));
    }

    #[test]
    fn arm_is_idempotent() {
        let mut t = Ticker::new(Duration::from_millis(50));
        t.arm(at(0));
        t.arm(at(30));
        assert_eq!(t.next(at(50)), Tick::Wait(Duration::from_millis(0)));
    }

    #[test]
    fn overrun_reanchors_schedule() {
        let mut t = Ticker::new(Duration::from_millis(50));
        t.arm(at(0));
        assert_eq!(t.next(at(70)), Tick::Overrun(Duration::from_millis(20)));
        assert_eq!(t.next(at(100)), Tick::Wait(Duration::from_millis(20)));
    }

    #[test]
    fn stats_track_max_and_overruns() {
        let mut s = LoopStats::default();
        s.record(Duration::from_micros(800), Tick::Wait(Duration::from_millis(1)));
        s.record(Duration::from_micros(300), Tick::Overrun(Duration::from_millis(1)));
        assert_eq!(s.iterations, 2);
        assert_eq!(s.last_busy_us, 300);
        assert_eq!(s.max_busy_us, 800);
        assert_eq!(s.overruns, 1);
    }
}
