use std::time::Instant;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use orch_core::SkillScores;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct NextQuery {
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct NextModuleResponse {
    pub next_module: String,
    pub reason: String,
    pub description: String,
    pub memory_context: Option<String>,
    pub weakness_trigger: Option<String>,
    pub scores: SkillScores,
    pub confidence: f64,
    pub depth: String,
    pub decision_id: Option<String>,
}

/// Assembles user state, scores every candidate module, optionally asks the
/// LLM to rewrite the reason in a warmer tone, then persists and reports the
/// decision. Always returns a module: a DB outage degrades to a lower
/// confidence rather than failing the request.
#[instrument(skip(state), fields(user_id = %query.user_id))]
pub async fn next(State(state): State<AppState>, Query(query): Query<NextQuery>) -> Json<NextModuleResponse> {
    let started = Instant::now();
    let user_id = query.user_id;

    let db_reachable = state.state_manager.db_is_reachable().await;
    let user_state = state.state_manager.get_user_state(&user_id).await;
    let service_health = state.service_registry.health_map();

    let mut decision = state.decision_engine.decide(&user_state, None, &service_health);
    if !db_reachable {
        decision.confidence = decision.confidence.min(0.3);
    }

    if let Some(decorated) = state
        .llm
        .decorate_reason(&decision.rule_reason, &decision.next_module)
        .await
    {
        decision.reason = decorated;
    }

    let decision_id = if db_reachable {
        let id = state.state_manager.record_decision(&user_id, &decision).await;
        if let Err(e) = state.state_manager.update_next_module(&user_id, &decision.next_module).await {
            tracing::warn!(user_id, error = %e, "failed to persist next_module");
        }
        id
    } else {
        None
    };

    state.metrics.record_decision(
        &user_id,
        &decision.next_module,
        decision.depth.as_str(),
        started.elapsed().as_secs_f64() * 1000.0,
        decision.confidence,
    );

    Json(NextModuleResponse {
        next_module: decision.next_module,
        reason: decision.reason,
        description: decision.description,
        memory_context: None,
        weakness_trigger: decision.weakness_trigger,
        scores: decision.scores,
        confidence: decision.confidence,
        depth: decision.depth.as_str().to_string(),
        decision_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use orch_core::EngineConfig;
    use orch_db::DbClient;

    #[tokio::test]
    async fn fresh_user_gets_a_module_with_reasonable_confidence() {
        let config = EngineConfig::default();
        let db = DbClient::connect(":memory:", None).await.unwrap();
        let state = AppState::new(config, db, "secret".to_string(), None);

        let response = next(
            State(state),
            Query(NextQuery { user_id: "fresh-user".to_string() }),
        )
        .await;

        assert!(!response.next_module.is_empty());
        assert!(response.confidence >= 0.3);
        assert!(response.memory_context.is_none());
    }
}
