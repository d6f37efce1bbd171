use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::instrument;

use crate::evaluator;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct EvaluateRequest {
    pub user_id: String,
    pub module: String,
    pub question: String,
    pub answer: String,
}

/// Always returns `{status:"ok"}` with a 200, even when the underlying DB or
/// LLM calls fail — failures are logged inside `evaluator::evaluate`.
#[instrument(skip(state, body), fields(user_id = %body.user_id, module = %body.module))]
pub async fn evaluate(State(state): State<AppState>, Json(body): Json<EvaluateRequest>) -> Json<Value> {
    evaluator::evaluate(&state, &body.user_id, &body.module, &body.question, &body.answer).await;
    Json(json!({ "status": "ok" }))
}
