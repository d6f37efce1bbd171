use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::Value;
use tracing::instrument;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct DecisionsQuery {
    pub user_id: String,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    20
}

/// Unlike the evaluator and `/api/next`, admin endpoints surface DB failures
/// directly rather than degrading silently.
#[instrument(skip(state))]
pub async fn decisions(State(state): State<AppState>, Query(query): Query<DecisionsQuery>) -> Result<Json<Value>, AppError> {
    let records = state.state_manager.list_decisions(&query.user_id, query.limit).await?;
    Ok(Json(serde_json::to_value(records).map_err(|e| AppError::Internal(e.into()))?))
}

#[instrument(skip(state))]
pub async fn metrics(State(state): State<AppState>) -> Json<Value> {
    Json(state.metrics.summary())
}

#[instrument(skip(state))]
pub async fn circuit_breakers(State(state): State<AppState>) -> Json<Value> {
    Json(state.circuit_breakers.all_status())
}

#[instrument(skip(state))]
pub async fn services(State(state): State<AppState>) -> Json<Value> {
    Json(state.service_registry.all_status())
}
