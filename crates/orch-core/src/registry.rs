use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tokio::sync::Notify;

use crate::circuit_breaker::{CbState, CircuitBreakerRegistry};
use crate::config::{EngineConfig, MODULES};

/// Health snapshot for one downstream service.
#[derive(Debug, Clone)]
pub struct ServiceHealth {
    pub name: String,
    pub status: String,
    pub is_embedded: bool,
    pub url: Option<String>,
    pub port: Option<u16>,
    pub last_check_time: Option<Instant>,
    pub last_response_time_ms: Option<f64>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    pub uptime_checks: u64,
    pub healthy_checks: u64,
}

impl ServiceHealth {
    fn embedded(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: "healthy".to_string(),
            is_embedded: true,
            url: None,
            port: None,
            last_check_time: None,
            last_response_time_ms: None,
            last_error: None,
            consecutive_failures: 0,
            uptime_checks: 0,
            healthy_checks: 0,
        }
    }

    fn downstream(name: &str, url: &str, port: Option<u16>) -> Self {
        Self {
            name: name.to_string(),
            status: "unknown".to_string(),
            is_embedded: false,
            url: Some(url.to_string()),
            port,
            last_check_time: None,
            last_response_time_ms: None,
            last_error: None,
            consecutive_failures: 0,
            uptime_checks: 0,
            healthy_checks: 0,
        }
    }

    pub fn availability_pct(&self) -> f64 {
        if self.uptime_checks == 0 {
            100.0
        } else {
            (self.healthy_checks as f64 / self.uptime_checks as f64 * 1000.0).round() / 10.0
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "status": self.status,
            "is_embedded": self.is_embedded,
            "url": self.url,
            "port": self.port,
            "latency_ms": self.last_response_time_ms,
            "availability_pct": self.availability_pct(),
            "consecutive_failures": self.consecutive_failures,
            "last_error": self.last_error,
        })
    }
}

/// The three services compiled into the same process as the gateway; never
/// probed over the network, always reported healthy.
pub const EMBEDDED_SERVICES: &[&str] = &["evaluator", "orchestrator", "job-search"];

/// Central registry of every downstream service, with a background health
/// monitor that feeds observed outcomes into each service's circuit breaker.
pub struct ServiceRegistry {
    config: EngineConfig,
    circuit_breakers: Arc<CircuitBreakerRegistry>,
    services: RwLock<HashMap<String, ServiceHealth>>,
    http: reqwest::Client,
    stop: Arc<Notify>,
}

impl ServiceRegistry {
    pub fn new(config: EngineConfig, circuit_breakers: Arc<CircuitBreakerRegistry>) -> Self {
        let mut services = HashMap::new();
        for module in MODULES {
            if let Some(base_url) = module.base_url {
                services.insert(
                    module.name.to_string(),
                    ServiceHealth::downstream(module.name, base_url, module.port),
                );
            }
        }
        for name in EMBEDDED_SERVICES {
            services.insert(name.to_string(), ServiceHealth::embedded(name));
        }

        Self {
            config,
            circuit_breakers,
            services: RwLock::new(services),
            http: reqwest::Client::new(),
            stop: Arc::new(Notify::new()),
        }
    }

    pub fn get(&self, name: &str) -> Option<ServiceHealth> {
        self.services.read().unwrap().get(name).cloned()
    }

    pub fn is_healthy(&self, name: &str) -> bool {
        match self.services.read().unwrap().get(name) {
            None => false,
            Some(svc) if svc.is_embedded => true,
            Some(_) => self.circuit_breakers.get(name).state() != CbState::Open,
        }
    }

    pub fn get_healthy_services(&self) -> Vec<String> {
        self.services
            .read()
            .unwrap()
            .iter()
            .filter(|(name, svc)| svc.is_embedded || self.is_healthy(name))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Map of `service_name -> is_healthy`, as consumed by the decision
    /// engine's candidate filter.
    pub fn health_map(&self) -> HashMap<String, bool> {
        self.services
            .read()
            .unwrap()
            .keys()
            .map(|name| (name.clone(), self.is_healthy(name)))
            .collect()
    }

    pub fn all_status(&self) -> serde_json::Value {
        let services = self.services.read().unwrap();
        let mut out = serde_json::Map::new();
        for (name, svc) in services.iter() {
            let mut status = svc.to_json();
            if !svc.is_embedded {
                let cb = self.circuit_breakers.get(name);
                status["circuit_breaker"] = serde_json::Value::String(cb.state().as_str().to_string());
            }
            out.insert(name.clone(), status);
        }
        serde_json::Value::Object(out)
    }

    /// Spawns the background probe loop. Returns a handle the caller should
    /// keep alive for the lifetime of the process; dropping the registry (or
    /// calling `stop_monitoring`) ends the loop on its next wakeup.
    pub fn start_monitoring(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            registry.health_check_loop().await;
        })
    }

    pub fn stop_monitoring(&self) {
        self.stop.notify_one();
    }

    async fn health_check_loop(self: Arc<Self>) {
        let interval = Duration::from_secs(self.config.health_check_interval_s);
        loop {
            let sleep = tokio::time::sleep(interval);
            tokio::select! {
                _ = self.stop.notified() => {
                    tracing::info!("health monitor stopped");
                    return;
                }
                _ = sleep => {}
            }

            if let Err(err) = self.check_all_services().await {
                tracing::error!(error = %err, "health check loop error, backing off");
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
        }
    }

    async fn check_all_services(&self) -> Result<(), String> {
        let targets: Vec<(String, String)> = {
            let services = self.services.read().unwrap();
            services
                .values()
                .filter(|s| !s.is_embedded)
                .filter_map(|s| s.url.clone().map(|u| (s.name.clone(), u)))
                .collect()
        };

        let checks = targets
            .into_iter()
            .map(|(name, url)| self.check_service(name, url));
        futures::future::join_all(checks).await;
        Ok(())
    }

    async fn check_service(&self, name: String, base_url: String) {
        let cb = self.circuit_breakers.get(&name);
        let url = format!("{base_url}/health");
        let timeout = Duration::from_secs_f64(self.config.health_check_timeout_s);
        let start = Instant::now();

        let outcome = self
            .http
            .get(&url)
            .timeout(timeout)
            .send()
            .await;

        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        let mut services = self.services.write().unwrap();
        let Some(svc) = services.get_mut(&name) else {
            return;
        };
        svc.uptime_checks += 1;
        svc.last_check_time = Some(Instant::now());
        svc.last_response_time_ms = Some(latency_ms);

        match outcome {
            Ok(resp) if resp.status().is_success() => {
                svc.status = "healthy".to_string();
                svc.consecutive_failures = 0;
                svc.healthy_checks += 1;
                svc.last_error = None;
                cb.record_success();
            }
            Ok(resp) => {
                svc.status = "degraded".to_string();
                svc.consecutive_failures += 1;
                svc.last_error = Some(format!("status {}", resp.status()));
                cb.record_failure();
            }
            Err(err) => {
                svc.status = "unhealthy".to_string();
                svc.consecutive_failures += 1;
                svc.last_error = Some(err.to_string());
                cb.record_failure();
            }
        }
    }
}
