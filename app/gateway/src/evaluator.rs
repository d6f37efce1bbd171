use tracing::{instrument, warn};

use crate::state::AppState;

/// Runs the evaluator pipeline for one `(question, answer)` submission.
/// Never fails visibly: every internal error is logged and swallowed so the
/// caller always sees `{status: "ok"}`.
#[instrument(skip(state, question, answer))]
pub async fn evaluate(state: &AppState, user_id: &str, module: &str, question: &str, answer: &str) {
    if let Err(e) = state
        .evaluator_store
        .insert_interaction(user_id, module, question, answer)
        .await
    {
        warn!(user_id, module, error = %e, "failed to insert interaction");
    }

    let started = std::time::Instant::now();
    let scores = state.llm.score_answer(question, answer).await;
    let succeeded = scores.clarity.is_some()
        || scores.tradeoffs.is_some()
        || scores.adaptability.is_some()
        || scores.failure_awareness.is_some()
        || scores.dsa_predict.is_some();
    state
        .metrics
        .record_llm_call(started.elapsed().as_secs_f64() * 1000.0, succeeded);

    if let Err(e) = state.evaluator_store.insert_scores(user_id, module, &scores).await {
        warn!(user_id, module, error = %e, "failed to insert scores");
    }

    if let Err(e) = state.aggregator.update_user_state(user_id).await {
        warn!(user_id, error = %e, "aggregation failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmClient;
    use orch_core::EngineConfig;
    use orch_db::DbClient;

    async fn test_state() -> AppState {
        let config = EngineConfig::default();
        let db = DbClient::connect(":memory:", None).await.unwrap();
        let mut state = AppState::new(config, db, "secret".to_string(), None);
        state.llm = std::sync::Arc::new(LlmClient::from_env(10.0));
        state
    }

    #[tokio::test]
    async fn evaluate_completes_and_aggregates_even_without_llm_configured() {
        let state = test_state().await;
        evaluate(&state, "u1", "production_interview", "why shard?", "to scale writes").await;

        let user_state = state.state_manager.get_user_state("u1").await;
        assert_eq!(user_state.scores, orch_core::SkillScores::default());
    }
}
