mod error;
mod evaluator;
mod handlers;
mod llm;
mod middleware;
mod routes;
mod state;

use std::env;
use std::sync::Arc;

use orch_core::EngineConfig;
use orch_db::DbClient;

use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    orch_telemetry::init_tracing("orch-gateway");

    let config = EngineConfig::load();

    let db_url = env::var("DATABASE_URL").unwrap_or_else(|_| ":memory:".to_string());
    let db_auth_token = env::var("DATABASE_AUTH_TOKEN").ok();
    let db = DbClient::connect(&db_url, db_auth_token).await?;

    let auth_secret = env::var("GATEWAY_AUTH_TOKEN").unwrap_or_default();
    let auth_secret_legacy = env::var("GATEWAY_AUTH_TOKEN_LEGACY").ok();

    let app_state = AppState::new(config, db, auth_secret, auth_secret_legacy);
    let service_registry = Arc::clone(&app_state.service_registry);
    let _health_monitor = service_registry.start_monitoring();

    let router = routes::build_router(app_state);

    let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "orch-gateway listening");

    axum::serve(listener, router).await?;
    Ok(())
}
