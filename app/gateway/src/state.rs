use std::sync::Arc;

use orch_core::{CircuitBreakerRegistry, DecisionEngine, EngineConfig, MetricsCollector, ServiceRegistry};
use orch_db::{Aggregator, DbClient, EvaluatorStore, StateManager};

use crate::llm::LlmClient;

/// Shared application state injected into every handler via `State<AppState>`.
/// Clone is cheap: everything behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<EngineConfig>,
    pub decision_engine: Arc<DecisionEngine>,
    pub metrics: Arc<MetricsCollector>,
    pub circuit_breakers: Arc<CircuitBreakerRegistry>,
    pub service_registry: Arc<ServiceRegistry>,
    pub state_manager: Arc<StateManager>,
    pub aggregator: Arc<Aggregator>,
    pub evaluator_store: Arc<EvaluatorStore>,
    pub llm: Arc<LlmClient>,
    pub auth_secret: String,
    pub auth_secret_legacy: Option<String>,
}

impl AppState {
    pub fn new(config: EngineConfig, db: DbClient, auth_secret: String, auth_secret_legacy: Option<String>) -> Self {
        let config = Arc::new(config);
        let circuit_breakers = Arc::new(CircuitBreakerRegistry::new(
            config.cb_failure_threshold,
            config.cb_recovery_timeout_s,
            config.cb_half_open_max_calls,
        ));
        let service_registry = Arc::new(ServiceRegistry::new((*config).clone(), circuit_breakers.clone()));

        Self {
            decision_engine: Arc::new(DecisionEngine::new((*config).clone())),
            metrics: Arc::new(MetricsCollector::new(config.metrics_buffer_size)),
            circuit_breakers,
            service_registry,
            state_manager: Arc::new(StateManager::new(db.clone())),
            aggregator: Arc::new(Aggregator::new(db.clone())),
            evaluator_store: Arc::new(EvaluatorStore::new(db)),
            llm: Arc::new(LlmClient::from_env(config.llm_timeout_seconds)),
            auth_secret,
            auth_secret_legacy,
            config,
        }
    }
}
