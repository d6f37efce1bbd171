use std::env;
use std::time::Duration;

use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::{middleware, Router};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::handlers::{evaluate, health, next, orchestrator, state as state_handler};
use crate::middleware::{auth_guard, health_guard};
use crate::state::AppState;

/// Reads `ALLOWED_ORIGINS` (comma-separated, default `"*"`). Credentials and
/// a wildcard origin are mutually exclusive per the CORS spec, so a wildcard
/// disables `allow_credentials` the same way the source system's
/// `CORSMiddleware` setup does.
fn build_cors_layer() -> CorsLayer {
    let raw = env::var("ALLOWED_ORIGINS").unwrap_or_else(|_| "*".to_string());
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    if raw.trim() == "*" {
        base.allow_origin(Any).allow_credentials(false)
    } else {
        let origins: Vec<HeaderValue> = raw
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .filter_map(|o| HeaderValue::from_str(o).ok())
            .collect();
        base.allow_origin(AllowOrigin::list(origins)).allow_credentials(true)
    }
}

pub fn build_router(app_state: AppState) -> Router {
    let cors = build_cors_layer();

    let orchestrator_routes = Router::new()
        .route("/decisions", get(orchestrator::decisions))
        .route("/metrics", get(orchestrator::metrics))
        .route("/circuit-breakers", get(orchestrator::circuit_breakers))
        .route("/services", get(orchestrator::services));

    // Reads of persisted state: 503 immediately when the database is down.
    let strict_routes = Router::new()
        .route("/state/:user_id", get(state_handler::get_state))
        .nest("/orchestrator", orchestrator_routes)
        .layer(middleware::from_fn_with_state(app_state.clone(), health_guard));

    // Fire-and-forget / always-degrade-gracefully endpoints: never gated by DB health.
    let graceful_routes = Router::new()
        .route("/evaluate", post(evaluate::evaluate))
        .route("/next", get(next::next));

    let api = Router::new()
        .merge(strict_routes)
        .merge(graceful_routes)
        .layer(middleware::from_fn_with_state(app_state.clone(), auth_guard));

    Router::new()
        .route("/health", get(health::health))
        .nest("/api", api)
        .layer(cors)
        .with_state(app_state)
}
