//! Circuit breaker: `closed -> open -> half-open -> closed`,
//! wrapping any fallible operation.

use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub reset_timeout_ms: u64,
    pub half_open_success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: crate::constants::DEFAULT_FAILURE_THRESHOLD,
            reset_timeout_ms: crate::constants::DEFAULT_RESET_TIMEOUT_MS,
            half_open_success_threshold: crate::constants::DEFAULT_HALF_OPEN_SUCCESS_THRESHOLD,
        }
    }
}

struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    last_failure_at: Option<Instant>,
}

/// Thread-safe circuit breaker. One instance wraps one logical operation
/// (e.g. "call the dense embedder").
pub struct CircuitBreaker {
    cfg: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

/// Result of a guarded call: either the breaker rejected it outright, or
/// the wrapped operation ran and produced `E`.
#[derive(Debug)]
pub enum CircuitError<E> {
    /// The breaker is open; the wrapped call was not attempted.
    Rejected,
    Inner(E),
}

impl<E: std::fmt::Debug> std::fmt::Display for CircuitError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitError::Rejected => write!(f, "circuit breaker open; call rejected"),
            CircuitError::Inner(e) => write!(f, "{e:?}"),
        }
    }
}

impl<E: std::fmt::Debug> std::error::Error for CircuitError<E> {}

impl CircuitBreaker {
    pub fn new(cfg: CircuitBreakerConfig) -> Self {
        Self {
            cfg,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                last_failure_at: None,
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.maybe_transition_to_half_open();
        self.inner.lock().unwrap().state
    }

    fn maybe_transition_to_half_open(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == CircuitState::Open
            && let Some(last_failure) = inner.last_failure_at
            && last_failure.elapsed() >= Duration::from_millis(self.cfg.reset_timeout_ms)
        {
            inner.state = CircuitState::HalfOpen;
            inner.consecutive_successes = 0;
        }
    }

    /// Call `op` if the breaker allows it; updates state on success/failure.
    pub fn call<T, E>(&self, op: impl FnOnce() -> Result<T, E>) -> Result<T, CircuitError<E>> {
        self.maybe_transition_to_half_open();
        if self.inner.lock().unwrap().state == CircuitState::Open {
            return Err(CircuitError::Rejected);
        }

        match op() {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(err) => {
                self.on_failure();
                Err(CircuitError::Inner(err))
            }
        }
    }

    fn on_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.cfg.half_open_success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.consecutive_failures = 0;
                    inner.consecutive_successes = 0;
                }
            }
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                inner.last_failure_at = Some(Instant::now());
                if inner.consecutive_failures >= self.cfg.failure_threshold {
                    inner.state = CircuitState::Open;
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.consecutive_successes = 0;
                inner.last_failure_at = Some(Instant::now());
            }
            CircuitState::Open => {
                inner.last_failure_at = Some(Instant::now());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 2,
            reset_timeout_ms: 20,
            half_open_success_threshold: 2,
        }
    }

    #[test]
    fn opens_after_failure_threshold() {
        let breaker = CircuitBreaker::new(cfg());
        let _ = breaker.call(|| Err::<(), _>("boom"));
        assert_eq!(breaker.state(), CircuitState::Closed);
        let _ = breaker.call(|| Err::<(), _>("boom"));
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn rejects_immediately_while_open() {
        let breaker = CircuitBreaker::new(cfg());
        let _ = breaker.call(|| Err::<(), _>("boom"));
        let _ = breaker.call(|| Err::<(), _>("boom"));
        let result = breaker.call(|| Ok::<_, &str>(1));
        assert!(matches!(result, Err(CircuitError::Rejected)));
    }

    #[test]
    fn half_open_closes_after_success_threshold() {
        let breaker = CircuitBreaker::new(cfg());
        let _ = breaker.call(|| Err::<(), _>("boom"));
        let _ = breaker.call(|| Err::<(), _>("boom"));
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        let _ = breaker.call(|| Ok::<_, &str>(1));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        let _ = breaker.call(|| Ok::<_, &str>(1));
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_reopens() {
        let breaker = CircuitBreaker::new(cfg());
        let _ = breaker.call(|| Err::<(), _>("boom"));
        let _ = breaker.call(|| Err::<(), _>("boom"));
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        let _ = breaker.call(|| Err::<(), _>("boom again"));
        assert_eq!(breaker.state(), CircuitState::Open);
    }
}
