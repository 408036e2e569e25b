//! Write-lock backoff arithmetic. This crate has no database
//! handle — it only computes the backoff schedule; `scry-store::with_write_lock`
//! drives an actual SQLite `BEGIN IMMEDIATE` using this schedule so the
//! backoff policy itself is testable without a database.

use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct BackoffConfig {
    pub initial_backoff_ms: u64,
    pub multiplier: f64,
    pub max_backoff_ms: u64,
    pub timeout_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: crate::constants::DEFAULT_INITIAL_BACKOFF_MS,
            multiplier: crate::constants::DEFAULT_BACKOFF_MULTIPLIER,
            max_backoff_ms: crate::constants::DEFAULT_MAX_BACKOFF_MS,
            timeout_ms: crate::constants::DEFAULT_WRITE_LOCK_TIMEOUT_MS,
        }
    }
}

/// Drives the `backoff = min(previous * multiplier, max_backoff)` schedule
/// and tracks total elapsed time against `timeout_ms`.
pub struct BackoffSchedule {
    cfg: BackoffConfig,
    previous_ms: u64,
    elapsed_ms: u64,
}

impl BackoffSchedule {
    pub fn new(cfg: BackoffConfig) -> Self {
        Self {
            cfg,
            previous_ms: 0,
            elapsed_ms: 0,
        }
    }

    /// Returns the next sleep duration, or `None` if sleeping it would
    /// exceed (or we've already exceeded) the acquisition timeout — the
    /// caller should give up with "failed to acquire" at that point.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.elapsed_ms >= self.cfg.timeout_ms {
            return None;
        }
        let next_ms = if self.previous_ms == 0 {
            self.cfg.initial_backoff_ms
        } else {
            ((self.previous_ms as f64) * self.cfg.multiplier)
                .min(self.cfg.max_backoff_ms as f64) as u64
        };
        self.previous_ms = next_ms;
        self.elapsed_ms += next_ms;
        Some(Duration::from_millis(next_ms))
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }

    pub fn timed_out(&self) -> bool {
        self.elapsed_ms >= self.cfg.timeout_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let cfg = BackoffConfig {
            initial_backoff_ms: 10,
            multiplier: 2.0,
            max_backoff_ms: 35,
            timeout_ms: 10_000,
        };
        let mut sched = BackoffSchedule::new(cfg);
        assert_eq!(sched.next_delay().unwrap().as_millis(), 10);
        assert_eq!(sched.next_delay().unwrap().as_millis(), 20);
        assert_eq!(sched.next_delay().unwrap().as_millis(), 35); // capped from 40
        assert_eq!(sched.next_delay().unwrap().as_millis(), 35);
    }

    #[test]
    fn schedule_gives_up_once_timeout_budget_is_exhausted() {
        let cfg = BackoffConfig {
            initial_backoff_ms: 10,
            multiplier: 2.0,
            max_backoff_ms: 500,
            timeout_ms: 25,
        };
        let mut sched = BackoffSchedule::new(cfg);
        assert!(sched.next_delay().is_some()); // 10ms, elapsed=10
        assert!(sched.next_delay().is_some()); // 20ms, elapsed=30 >= would exceed check happens before
        assert!(sched.timed_out());
        assert!(sched.next_delay().is_none());
    }
}
