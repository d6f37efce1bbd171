use std::time::Duration;

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::instrument;

use orch_core::MODULES;

use crate::state::AppState;

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Parallel liveness probe of every downstream service plus the embedded
/// ones, independent of the background health monitor's cached state.
/// Embedded services always report healthy unless the database itself is
/// unreachable.
#[instrument(skip(state))]
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let db_connected = state.state_manager.db_is_reachable().await;

    let http = reqwest::Client::new();
    let probes = MODULES.iter().filter_map(|m| {
        let base_url = m.base_url?;
        Some(probe_service(&http, m.name, base_url))
    });
    let downstream: Vec<(String, Value)> = futures::future::join_all(probes).await;

    let mut services = serde_json::Map::new();
    for (name, status) in downstream {
        services.insert(name, status);
    }
    for name in orch_core::registry::EMBEDDED_SERVICES {
        let status = if db_connected { "healthy" } else { "degraded" };
        services.insert((*name).to_string(), json!({ "status": status }));
    }

    let overall = if db_connected { "ok" } else { "degraded" };

    Json(json!({
        "status": overall,
        "timestamp": Utc::now().to_rfc3339(),
        "services": services,
        "database": if db_connected { "connected" } else { "disconnected" },
    }))
}

async fn probe_service(http: &reqwest::Client, name: &str, base_url: &str) -> (String, Value) {
    let url = format!("{base_url}/health");
    let result = http.get(&url).timeout(PROBE_TIMEOUT).send().await;
    let status = match result {
        Ok(resp) if resp.status().is_success() => "healthy",
        Ok(_) => "degraded",
        Err(_) => "unhealthy",
    };
    (name.to_string(), json!({ "status": status }))
}
