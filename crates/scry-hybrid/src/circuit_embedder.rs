//! Wraps any [`Embedder`] with a [`CircuitBreaker`]. Once the breaker trips
//! open, calls are rejected without touching the backend at all, so a dead
//! embedding service doesn't add latency to every subsequent query;
//! `HybridIndex`/`hybrid_search` already know how to degrade to
//! lexical-only on an `EmbedderError`, so the rejection is mapped to
//! `Timeout` rather than a new error shape.

use crate::embedder::Embedder;
use scry_core::circuit::{CircuitBreaker, CircuitBreakerConfig, CircuitError};
use scry_core::error::EmbedderError;

pub struct CircuitBreakerEmbedder<E> {
    inner: E,
    breaker: CircuitBreaker,
}

impl<E: Embedder> CircuitBreakerEmbedder<E> {
    pub fn new(inner: E, cfg: CircuitBreakerConfig) -> Self {
        Self {
            inner,
            breaker: CircuitBreaker::new(cfg),
        }
    }
}

impl<E: Embedder> Embedder for CircuitBreakerEmbedder<E> {
    fn init(&mut self) -> Result<(), EmbedderError> {
        self.inner.init()
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        self.breaker.call(|| self.inner.embed(texts)).map_err(|err| match err {
            CircuitError::Rejected => EmbedderError::Timeout { elapsed_ms: 0 },
            CircuitError::Inner(e) => e,
        })
    }

    fn dim(&self) -> usize {
        self.inner.dim()
    }

    fn dispose(&mut self) {
        self.inner.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct AlwaysFails {
        calls: AtomicU32,
    }

    impl Embedder for AlwaysFails {
        fn init(&mut self) -> Result<(), EmbedderError> {
            Ok(())
        }

        fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(EmbedderError::Network("connection refused".to_string()))
        }

        fn dim(&self) -> usize {
            4
        }
    }

    #[test]
    fn trips_open_and_stops_calling_the_backend() {
        let cfg = CircuitBreakerConfig {
            failure_threshold: 2,
            reset_timeout_ms: 10_000,
            half_open_success_threshold: 1,
        };
        let embedder = CircuitBreakerEmbedder::new(
            AlwaysFails {
                calls: AtomicU32::new(0),
            },
            cfg,
        );

        let _ = embedder.embed(&["a".to_string()]);
        let _ = embedder.embed(&["b".to_string()]);
        let before = embedder.inner.calls.load(Ordering::SeqCst);
        assert_eq!(before, 2);

        let err = embedder.embed(&["c".to_string()]).unwrap_err();
        assert!(matches!(err, EmbedderError::Timeout { .. }));
        assert_eq!(embedder.inner.calls.load(Ordering::SeqCst), before);
    }
}
