use thiserror::Error;

/// Errors surfaced by the decision engine, circuit breaker, and service registry.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("circuit breaker [{0}] is open, recovery in {1:.0}s")]
    CircuitOpen(String, f64),

    #[error("no candidate modules available")]
    NoCandidates,

    #[error("health probe failed: {0}")]
    ProbeFailed(#[from] reqwest::Error),

    #[error("unknown module: {0}")]
    UnknownModule(String),
}
