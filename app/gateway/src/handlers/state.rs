use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use tracing::instrument;

use orch_core::SkillScores;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct UserStateResponse {
    pub user_id: String,
    pub scores: SkillScores,
    pub next_module: Option<String>,
    pub target_role: Option<String>,
    pub recent_modules: Vec<String>,
    pub depth: String,
}

#[instrument(skip(state))]
pub async fn get_state(State(state): State<AppState>, Path(user_id): Path<String>) -> Json<UserStateResponse> {
    let user_state = state.state_manager.get_user_state(&user_id).await;
    let health = state.service_registry.health_map();
    let depth = state.decision_engine.decide(&user_state, None, &health).depth;

    Json(UserStateResponse {
        user_id: user_state.user_id,
        scores: user_state.scores,
        next_module: user_state.next_module,
        target_role: user_state.target_role,
        recent_modules: user_state.recent_modules.into_iter().take(5).collect(),
        depth: depth.as_str().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use orch_core::EngineConfig;
    use orch_db::DbClient;

    #[tokio::test]
    async fn unknown_user_gets_default_state() {
        let config = EngineConfig::default();
        let db = DbClient::connect(":memory:", None).await.unwrap();
        let state = AppState::new(config, db, "secret".to_string(), None);

        let response = get_state(State(state), Path("brand-new".to_string())).await;
        assert_eq!(response.user_id, "brand-new");
        assert_eq!(response.scores, SkillScores::default());
        assert!(response.recent_modules.is_empty());
    }
}
