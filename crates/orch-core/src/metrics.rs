use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Instant;

/// Monotonically increasing counter with a per-label breakdown.
pub struct Counter {
    name: String,
    total: Mutex<u64>,
    by_label: Mutex<HashMap<String, u64>>,
}

impl Counter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            total: Mutex::new(0),
            by_label: Mutex::new(HashMap::new()),
        }
    }

    pub fn inc(&self, label: &str) {
        self.inc_by(label, 1);
    }

    pub fn inc_by(&self, label: &str, amount: u64) {
        *self.total.lock().unwrap() += amount;
        *self
            .by_label
            .lock()
            .unwrap()
            .entry(label.to_string())
            .or_insert(0) += amount;
    }

    pub fn total(&self) -> u64 {
        *self.total.lock().unwrap()
    }

    pub fn by_label(&self) -> HashMap<String, u64> {
        self.by_label.lock().unwrap().clone()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "total": self.total(),
            "by_label": self.by_label(),
        })
    }
}

/// Bounded FIFO of float observations backing p50/p95/p99 reporting.
/// When full, the oldest sample is evicted.
pub struct Histogram {
    name: String,
    max_samples: usize,
    samples: Mutex<VecDeque<f64>>,
}

impl Histogram {
    pub fn new(name: impl Into<String>, max_samples: usize) -> Self {
        Self {
            name: name.into(),
            max_samples,
            samples: Mutex::new(VecDeque::with_capacity(max_samples)),
        }
    }

    pub fn observe(&self, value: f64) {
        let mut samples = self.samples.lock().unwrap();
        if samples.len() == self.max_samples {
            samples.pop_front();
        }
        samples.push_back(value);
    }

    pub fn count(&self) -> usize {
        self.samples.lock().unwrap().len()
    }

    pub fn avg(&self) -> f64 {
        let samples = self.samples.lock().unwrap();
        if samples.is_empty() {
            return 0.0;
        }
        samples.iter().sum::<f64>() / samples.len() as f64
    }

    pub fn p50(&self) -> f64 {
        self.percentile(50)
    }

    pub fn p95(&self) -> f64 {
        self.percentile(95)
    }

    pub fn p99(&self) -> f64 {
        self.percentile(99)
    }

    fn percentile(&self, pct: usize) -> f64 {
        let samples = self.samples.lock().unwrap();
        if samples.is_empty() {
            return 0.0;
        }
        let mut sorted: Vec<f64> = samples.iter().copied().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let idx = (sorted.len() * pct) / 100;
        sorted[idx.min(sorted.len() - 1)]
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "count": self.count(),
            "avg": round3(self.avg()),
            "p50": round3(self.p50()),
            "p95": round3(self.p95()),
            "p99": round3(self.p99()),
        })
    }
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

#[derive(Debug, Clone, Serialize)]
struct RecentDecision {
    user_id: String,
    module: String,
    depth: String,
    latency_ms: f64,
    confidence: f64,
}

/// Central, process-wide metrics collection. No persistence: a restart
/// resets every counter and histogram.
pub struct MetricsCollector {
    started_at: Instant,
    pub decisions_total: Counter,
    pub decisions_by_depth: Counter,
    pub llm_failures: Counter,
    pub circuit_breaker_trips: Counter,
    pub health_checks: Counter,
    pub feedback_events: Counter,
    pub errors_total: Counter,
    pub decision_latency: Histogram,
    pub llm_latency: Histogram,
    pub db_latency: Histogram,
    active_users: Mutex<std::collections::HashSet<String>>,
    recent_decisions: Mutex<VecDeque<RecentDecision>>,
}

const RECENT_DECISIONS_CAPACITY: usize = 50;

impl MetricsCollector {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            started_at: Instant::now(),
            decisions_total: Counter::new("decisions_total"),
            decisions_by_depth: Counter::new("decisions_by_depth"),
            llm_failures: Counter::new("llm_failures_total"),
            circuit_breaker_trips: Counter::new("circuit_breaker_trips"),
            health_checks: Counter::new("health_checks"),
            feedback_events: Counter::new("feedback_events_total"),
            errors_total: Counter::new("errors_total"),
            decision_latency: Histogram::new("decision_latency_ms", buffer_size),
            llm_latency: Histogram::new("llm_latency_ms", buffer_size),
            db_latency: Histogram::new("db_latency_ms", buffer_size),
            active_users: Mutex::new(std::collections::HashSet::new()),
            recent_decisions: Mutex::new(VecDeque::with_capacity(RECENT_DECISIONS_CAPACITY)),
        }
    }

    pub fn record_decision(
        &self,
        user_id: &str,
        module: &str,
        depth: &str,
        latency_ms: f64,
        confidence: f64,
    ) {
        self.decisions_total.inc(module);
        self.decisions_by_depth.inc(depth);
        self.decision_latency.observe(latency_ms);
        self.active_users.lock().unwrap().insert(user_id.to_string());

        let mut recent = self.recent_decisions.lock().unwrap();
        if recent.len() == RECENT_DECISIONS_CAPACITY {
            recent.pop_front();
        }
        recent.push_back(RecentDecision {
            user_id: user_id.chars().take(8).collect::<String>() + "...",
            module: module.to_string(),
            depth: depth.to_string(),
            latency_ms: (latency_ms * 10.0).round() / 10.0,
            confidence: (confidence * 100.0).round() / 100.0,
        });
    }

    pub fn record_llm_call(&self, latency_ms: f64, success: bool) {
        self.llm_latency.observe(latency_ms);
        if !success {
            self.llm_failures.inc("__total__");
        }
    }

    pub fn record_db_call(&self, latency_ms: f64) {
        self.db_latency.observe(latency_ms);
    }

    pub fn record_circuit_trip(&self, service: &str) {
        self.circuit_breaker_trips.inc(service);
    }

    pub fn record_error(&self, error_type: &str) {
        self.errors_total.inc(error_type);
    }

    pub fn uptime_seconds(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }

    pub fn active_user_count(&self) -> usize {
        self.active_users.lock().unwrap().len()
    }

    pub fn summary(&self) -> serde_json::Value {
        let recent: Vec<_> = self
            .recent_decisions
            .lock()
            .unwrap()
            .iter()
            .rev()
            .take(10)
            .cloned()
            .collect();
        serde_json::json!({
            "uptime_seconds": (self.uptime_seconds() * 10.0).round() / 10.0,
            "active_users": self.active_user_count(),
            "decisions": self.decisions_total.to_json(),
            "decisions_by_depth": self.decisions_by_depth.to_json(),
            "decision_latency": self.decision_latency.to_json(),
            "llm_latency": self.llm_latency.to_json(),
            "llm_failures": self.llm_failures.to_json(),
            "db_latency": self.db_latency.to_json(),
            "circuit_breaker_trips": self.circuit_breaker_trips.to_json(),
            "errors": self.errors_total.to_json(),
            "recent_decisions": recent,
        })
    }

    pub fn health_summary(&self) -> serde_json::Value {
        let total_decisions = self.decisions_total.total().max(1);
        serde_json::json!({
            "uptime_s": self.uptime_seconds().round(),
            "total_decisions": self.decisions_total.total(),
            "active_users": self.active_user_count(),
            "avg_latency_ms": (self.decision_latency.avg() * 10.0).round() / 10.0,
            "p95_latency_ms": (self.decision_latency.p95() * 10.0).round() / 10.0,
            "error_rate": (self.errors_total.total() as f64 / total_decisions as f64 * 10000.0).round() / 10000.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_tracks_total_and_labels() {
        let c = Counter::new("x");
        c.inc("a");
        c.inc("a");
        c.inc("b");
        assert_eq!(c.total(), 3);
        assert_eq!(c.by_label().get("a"), Some(&2));
        assert_eq!(c.by_label().get("b"), Some(&1));
    }

    #[test]
    fn histogram_evicts_oldest_when_full() {
        let h = Histogram::new("h", 3);
        h.observe(1.0);
        h.observe(2.0);
        h.observe(3.0);
        h.observe(4.0);
        assert_eq!(h.count(), 3);
        assert_eq!(h.avg(), 3.0); // (2+3+4)/3
    }

    #[test]
    fn percentiles_on_known_distribution() {
        let h = Histogram::new("h", 100);
        for v in 1..=100 {
            h.observe(v as f64);
        }
        assert_eq!(h.p50(), 51.0);
        assert_eq!(h.p99(), 100.0);
    }

    #[test]
    fn empty_histogram_reports_zero() {
        let h = Histogram::new("h", 10);
        assert_eq!(h.avg(), 0.0);
        assert_eq!(h.p95(), 0.0);
    }

    #[test]
    fn collector_dedups_active_users() {
        let m = MetricsCollector::new(100);
        m.record_decision("u1", "dsa_practice", "normal", 12.0, 0.9);
        m.record_decision("u1", "dsa_practice", "normal", 8.0, 0.8);
        m.record_decision("u2", "resume_builder", "normal", 5.0, 0.7);
        assert_eq!(m.active_user_count(), 2);
        assert_eq!(m.decisions_total.total(), 3);
    }
}
