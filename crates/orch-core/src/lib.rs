pub mod circuit_breaker;
pub mod config;
pub mod decision;
pub mod error;
pub mod metrics;
pub mod models;
pub mod registry;

pub use circuit_breaker::{CbState, CircuitBreaker, CircuitBreakerRegistry, CircuitCallError};
pub use config::{EngineConfig, ModuleDefinition, MODULES};
pub use decision::DecisionEngine;
pub use error::EngineError;
pub use metrics::MetricsCollector;
pub use models::{Decision, DecisionDepth, MemoryContext, MemoryEvent, MemoryPattern, ModuleScore, SkillScores, UserState};
pub use registry::{ServiceHealth, ServiceRegistry};
