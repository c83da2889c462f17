//! Rate limiting for progress lines.

use std::time::{Duration, Instant};

/// Percentage of `total` settled after `done` items; 100 for empty work
pub fn percent(done: usize, total: usize) -> f64 {
    if total == 0 {
        return 100.0;
    }
    done as f64 * 100.0 / total as f64
}

/// Lets a percentage through only when it grew since the last one emitted,
/// so progress lines are never repeated and never go backwards.
#[derive(Debug, Default)]
pub struct PercentThrottle {
    last: Option<f64>,
}

impl PercentThrottle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value to report, if any
    pub fn update(&mut self, percent: f64) -> Option<f64> {
        match self.last {
            Some(last) if percent <= last => None,
            _ => {
                self.last = Some(percent);
                Some(percent)
            }
        }
    }
}

/// Lets at most one report through per interval
#[derive(Debug)]
pub struct IntervalThrottle {
    interval: Duration,
    last: Instant,
}

impl IntervalThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Instant::now(),
        }
    }

    /// One report per second
    pub fn per_second() -> Self {
        Self::new(Duration::from_secs(1))
    }

    /// True when at least one interval passed since the last report
    pub fn ready(&mut self) -> bool {
        if self.last.elapsed() >= self.interval {
            self.last = Instant::now();
            true
        } else {
            false
        }
    }
}
