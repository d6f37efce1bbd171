use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::warn;

use crate::state::AppState;

/// Accepts a bearer token matching either the primary or legacy secret.
/// No JWT decoding: the gateway only ever compares a shared secret.
pub async fn auth_guard(State(state): State<AppState>, req: Request, next: Next) -> Result<Response, StatusCode> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));

    match token {
        Some(t) if t == state.auth_secret => Ok(next.run(req).await),
        Some(t) if state.auth_secret_legacy.as_deref() == Some(t) => Ok(next.run(req).await),
        _ => {
            warn!("rejected request with missing or invalid bearer token");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

/// Short-circuits with 503 when the database is unreachable. Only mounted on
/// the read-oriented state/admin routes — `/api/evaluate` and `/api/next`
/// degrade gracefully instead and must never sit behind this guard.
pub async fn health_guard(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if !state.state_manager.db_is_reachable().await {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "detail": "database unavailable" })),
        )
            .into_response();
    }
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::routing::get;
    use axum::Router;
    use orch_core::EngineConfig;
    use orch_db::DbClient;
    use tower::ServiceExt;

    async fn test_state() -> AppState {
        let config = EngineConfig::default();
        let db = DbClient::connect(":memory:", None).await.unwrap();
        AppState::new(config, db, "current-secret".to_string(), Some("old-secret".to_string()))
    }

    fn app(state: AppState) -> Router {
        Router::new()
            .route("/protected", get(|| async { "ok" }))
            .layer(axum::middleware::from_fn_with_state(state.clone(), auth_guard))
            .with_state(state)
    }

    #[tokio::test]
    async fn rejects_missing_token() {
        let state = test_state().await;
        let response = app(state)
            .oneshot(axum::http::Request::builder().uri("/protected").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn accepts_current_secret() {
        let state = test_state().await;
        let response = app(state)
            .oneshot(
                axum::http::Request::builder()
                    .uri("/protected")
                    .header(header::AUTHORIZATION, "Bearer current-secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn accepts_legacy_secret() {
        let state = test_state().await;
        let response = app(state)
            .oneshot(
                axum::http::Request::builder()
                    .uri("/protected")
                    .header(header::AUTHORIZATION, "Bearer old-secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn rejects_wrong_token() {
        let state = test_state().await;
        let response = app(state)
            .oneshot(
                axum::http::Request::builder()
                    .uri("/protected")
                    .header(header::AUTHORIZATION, "Bearer nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
