use libsql::Connection;
use tracing::{debug, info, warn};

use crate::error::DbError;

const TABLES: &[(&str, &str)] = &[
    (
        "user_state",
        r#"
        CREATE TABLE IF NOT EXISTS user_state (
            user_id TEXT PRIMARY KEY,
            clarity_avg REAL DEFAULT 1.0,
            tradeoff_avg REAL DEFAULT 1.0,
            adaptability_avg REAL DEFAULT 1.0,
            failure_awareness_avg REAL DEFAULT 1.0,
            dsa_predict_skill REAL DEFAULT 1.0,
            next_module TEXT,
            last_update DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#,
    ),
    (
        "user_onboarding",
        r#"
        CREATE TABLE IF NOT EXISTS user_onboarding (
            user_id TEXT PRIMARY KEY,
            target_role TEXT,
            primary_focus TEXT
        );
    "#,
    ),
    (
        "interactions",
        r#"
        CREATE TABLE IF NOT EXISTS interactions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            module TEXT NOT NULL,
            step_type TEXT,
            question TEXT,
            user_answer TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#,
    ),
    (
        "scores",
        r#"
        CREATE TABLE IF NOT EXISTS scores (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            module TEXT NOT NULL,
            clarity REAL,
            tradeoffs REAL,
            adaptability REAL,
            failure_awareness REAL,
            dsa_predict REAL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#,
    ),
    (
        "orchestrator_decisions",
        r#"
        CREATE TABLE IF NOT EXISTS orchestrator_decisions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            input_snapshot TEXT NOT NULL,
            next_module TEXT NOT NULL,
            depth INTEGER NOT NULL,
            reason TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#,
    ),
];

const INDEXES: &[(&str, &str)] = &[
    (
        "idx_scores_user",
        "CREATE INDEX IF NOT EXISTS idx_scores_user ON scores(user_id);",
    ),
    (
        "idx_interactions_user",
        "CREATE INDEX IF NOT EXISTS idx_interactions_user ON interactions(user_id);",
    ),
    (
        "idx_decisions_user_created",
        "CREATE INDEX IF NOT EXISTS idx_decisions_user_created ON orchestrator_decisions(user_id, created_at DESC);",
    ),
];

/// Creates every table and index if absent. Safe to call on every startup
/// and on every fresh connection to an in-memory database.
pub async fn apply_schema(conn: &Connection) -> Result<(), DbError> {
    for (name, sql) in TABLES {
        debug!(table = name, "applying table");
        conn.execute(sql, ()).await.map_err(|e| {
            DbError::ConfigurationError(format!("table {name} failed: {e}"))
        })?;
    }
    for (name, sql) in INDEXES {
        match conn.execute(sql, ()).await {
            Ok(_) => {}
            Err(e) => warn!(index = name, error = %e, "index creation skipped"),
        }
    }
    info!("schema applied");
    Ok(())
}
