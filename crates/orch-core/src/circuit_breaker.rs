use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use std::time::Instant;

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CbState {
    Closed,
    Open,
    HalfOpen,
}

impl CbState {
    pub fn as_str(self) -> &'static str {
        match self {
            CbState::Closed => "closed",
            CbState::Open => "open",
            CbState::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct CircuitBreakerStats {
    pub total_calls: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub total_rejections: u64,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    #[serde(skip)]
    pub last_failure_time: Option<Instant>,
    #[serde(skip)]
    pub last_success_time: Option<Instant>,
    pub state_changes: u64,
}

impl CircuitBreakerStats {
    pub fn success_rate(&self) -> f64 {
        if self.total_calls == 0 {
            1.0
        } else {
            (self.total_successes as f64 / self.total_calls as f64 * 1000.0).round() / 1000.0
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "total_calls": self.total_calls,
            "total_successes": self.total_successes,
            "total_failures": self.total_failures,
            "total_rejections": self.total_rejections,
            "consecutive_failures": self.consecutive_failures,
            "success_rate": self.success_rate(),
        })
    }
}

/// Outcome of a [`CircuitBreaker::call`]: either the breaker rejected the
/// call outright, or the wrapped future ran and failed on its own terms.
#[derive(Debug, thiserror::Error)]
pub enum CircuitCallError<E: std::error::Error + 'static> {
    #[error(transparent)]
    Open(EngineError),
    #[error(transparent)]
    Inner(E),
}

struct Inner {
    state: CbState,
    stats: CircuitBreakerStats,
    half_open_calls: u32,
}

/// Per-service three-state breaker: closed (traffic flows), open (traffic
/// blocked), half-open (limited test traffic). See SPEC_FULL.md §4.C.
pub struct CircuitBreaker {
    pub name: String,
    pub failure_threshold: u32,
    pub recovery_timeout_s: u64,
    pub half_open_max_calls: u32,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(
        name: impl Into<String>,
        failure_threshold: u32,
        recovery_timeout_s: u64,
        half_open_max_calls: u32,
    ) -> Self {
        Self {
            name: name.into(),
            failure_threshold,
            recovery_timeout_s,
            half_open_max_calls,
            inner: Mutex::new(Inner {
                state: CbState::Closed,
                stats: CircuitBreakerStats::default(),
                half_open_calls: 0,
            }),
        }
    }

    /// Current state, applying the lazy open → half-open transition if the
    /// recovery timeout has elapsed since the last failure.
    pub fn state(&self) -> CbState {
        let mut inner = self.inner.lock().unwrap();
        self.maybe_transition_to_half_open(&mut inner);
        inner.state
    }

    fn maybe_transition_to_half_open(&self, inner: &mut Inner) {
        if inner.state == CbState::Open {
            if let Some(last_failure) = inner.stats.last_failure_time {
                if last_failure.elapsed().as_secs() >= self.recovery_timeout_s {
                    self.transition(inner, CbState::HalfOpen);
                }
            }
        }
    }

    fn transition(&self, inner: &mut Inner, new_state: CbState) {
        inner.state = new_state;
        inner.stats.state_changes += 1;
        if new_state == CbState::HalfOpen {
            inner.half_open_calls = 0;
        }
        if new_state == CbState::Closed {
            inner.stats.consecutive_failures = 0;
        }
        tracing::info!(
            breaker = %self.name,
            new_state = new_state.as_str(),
            "circuit breaker transition"
        );
    }

    pub fn is_available(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        self.maybe_transition_to_half_open(&mut inner);
        match inner.state {
            CbState::Closed => true,
            CbState::HalfOpen => inner.half_open_calls < self.half_open_max_calls,
            CbState::Open => false,
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.stats.total_calls += 1;
        inner.stats.total_successes += 1;
        inner.stats.consecutive_successes += 1;
        inner.stats.consecutive_failures = 0;
        inner.stats.last_success_time = Some(Instant::now());

        if inner.state == CbState::HalfOpen {
            inner.half_open_calls += 1;
            if inner.stats.consecutive_successes >= self.half_open_max_calls {
                self.transition(&mut inner, CbState::Closed);
            }
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.stats.total_calls += 1;
        inner.stats.total_failures += 1;
        inner.stats.consecutive_failures += 1;
        inner.stats.consecutive_successes = 0;
        inner.stats.last_failure_time = Some(Instant::now());

        if inner.state == CbState::HalfOpen {
            self.transition(&mut inner, CbState::Open);
        } else if inner.stats.consecutive_failures >= self.failure_threshold {
            self.transition(&mut inner, CbState::Open);
        }
    }

    fn time_until_recovery(&self, inner: &Inner) -> f64 {
        match inner.stats.last_failure_time {
            None => 0.0,
            Some(t) => {
                let elapsed = t.elapsed().as_secs_f64();
                (self.recovery_timeout_s as f64 - elapsed).max(0.0)
            }
        }
    }

    /// Executes `fut` through the breaker: rejects immediately with
    /// `CircuitCallError::Open` when unavailable, otherwise records the
    /// outcome after awaiting it and passes the inner error through unchanged.
    pub async fn call<F, Fut, T, E>(&self, fut: F) -> Result<T, CircuitCallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        if !self.is_available() {
            let wait = {
                let inner = self.inner.lock().unwrap();
                self.time_until_recovery(&inner)
            };
            self.inner.lock().unwrap().stats.total_rejections += 1;
            return Err(CircuitCallError::Open(EngineError::CircuitOpen(
                self.name.clone(),
                wait,
            )));
        }

        match fut().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(e) => {
                self.record_failure();
                Err(CircuitCallError::Inner(e))
            }
        }
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        self.transition(&mut inner, CbState::Closed);
        inner.stats.consecutive_failures = 0;
        inner.stats.consecutive_successes = 0;
    }

    pub fn to_json(&self) -> serde_json::Value {
        let state = self.state();
        let inner = self.inner.lock().unwrap();
        serde_json::json!({
            "name": self.name,
            "state": state.as_str(),
            "is_available": self.is_available(),
            "stats": inner.stats.to_json(),
            "config": {
                "failure_threshold": self.failure_threshold,
                "recovery_timeout_s": self.recovery_timeout_s,
                "half_open_max_calls": self.half_open_max_calls,
            },
        })
    }
}

/// Lazily creates and owns one [`CircuitBreaker`] per downstream service.
pub struct CircuitBreakerRegistry {
    breakers: RwLock<HashMap<String, std::sync::Arc<CircuitBreaker>>>,
    failure_threshold: u32,
    recovery_timeout_s: u64,
    half_open_max_calls: u32,
}

impl CircuitBreakerRegistry {
    pub fn new(failure_threshold: u32, recovery_timeout_s: u64, half_open_max_calls: u32) -> Self {
        Self {
            breakers: RwLock::new(HashMap::new()),
            failure_threshold,
            recovery_timeout_s,
            half_open_max_calls,
        }
    }

    pub fn get(&self, service_name: &str) -> std::sync::Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.read().unwrap().get(service_name) {
            return existing.clone();
        }
        let mut breakers = self.breakers.write().unwrap();
        breakers
            .entry(service_name.to_string())
            .or_insert_with(|| {
                std::sync::Arc::new(CircuitBreaker::new(
                    service_name,
                    self.failure_threshold,
                    self.recovery_timeout_s,
                    self.half_open_max_calls,
                ))
            })
            .clone()
    }

    pub fn all_status(&self) -> serde_json::Value {
        let breakers = self.breakers.read().unwrap();
        let mut out = serde_json::Map::new();
        for (name, cb) in breakers.iter() {
            out.insert(name.clone(), cb.to_json());
        }
        serde_json::Value::Object(out)
    }

    pub fn reset_all(&self) {
        for cb in self.breakers.read().unwrap().values() {
            cb.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_failure_threshold() {
        let cb = CircuitBreaker::new("svc", 3, 60, 2);
        assert_eq!(cb.state(), CbState::Closed);
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CbState::Closed);
        cb.record_failure();
        assert_eq!(cb.state(), CbState::Open);
        assert!(!cb.is_available());
    }

    #[test]
    fn half_open_failure_reopens() {
        let cb = CircuitBreaker::new("svc", 1, 0, 2);
        cb.record_failure();
        assert_eq!(cb.state(), CbState::HalfOpen); // recovery_timeout_s=0, elapses instantly
        cb.record_failure();
        assert_eq!(cb.state(), CbState::Open);
    }

    #[test]
    fn half_open_success_closes_after_threshold() {
        let cb = CircuitBreaker::new("svc", 1, 0, 2);
        cb.record_failure();
        assert_eq!(cb.state(), CbState::HalfOpen);
        cb.record_success();
        assert_eq!(cb.state(), CbState::HalfOpen);
        cb.record_success();
        assert_eq!(cb.state(), CbState::Closed);
    }

    #[test]
    fn reset_forces_closed() {
        let cb = CircuitBreaker::new("svc", 1, 9999, 2);
        cb.record_failure();
        assert_eq!(cb.state(), CbState::Open);
        cb.reset();
        assert_eq!(cb.state(), CbState::Closed);
    }

    #[test]
    fn registry_reuses_breaker_per_service() {
        let registry = CircuitBreakerRegistry::new(5, 60, 2);
        let a = registry.get("course");
        let b = registry.get("course");
        a.record_failure();
        assert_eq!(b.stats_snapshot_failures(), 1);
    }

    impl CircuitBreaker {
        fn stats_snapshot_failures(&self) -> u64 {
            self.inner.lock().unwrap().stats.total_failures
        }
    }
}
