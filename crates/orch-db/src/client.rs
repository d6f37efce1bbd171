use std::sync::Arc;

use libsql::{Builder, Connection, Database};
use tracing::{info, instrument};

use crate::error::DbError;
use crate::schema::apply_schema;

/// Owns a libsql [`Database`] handle and hands out connections to it.
///
/// When the backing database lives entirely in memory, SQLite purges it the
/// moment its last connection closes. `_memory_anchor` keeps one connection
/// open for the lifetime of the client so the schema and data survive
/// between pooled connections.
#[derive(Clone)]
pub struct DbClient {
    database: Arc<Database>,
    _memory_anchor: Option<Arc<Connection>>,
}

impl DbClient {
    #[instrument(skip(auth_token))]
    pub async fn connect(url: &str, auth_token: Option<String>) -> Result<Self, DbError> {
        if url.is_empty() {
            return Err(DbError::ConfigurationError("database url is empty".into()));
        }

        let is_remote = url.starts_with("libsql://") || url.starts_with("https://");
        let is_memory = url == ":memory:" || url.contains("mode=memory");

        let database = if is_remote {
            let token = auth_token.ok_or_else(|| {
                DbError::ConfigurationError("remote database url requires an auth token".into())
            })?;
            Builder::new_remote(url.to_string(), token).build().await
        } else {
            Builder::new_local(url).build().await
        }
        .map_err(|e| DbError::ConnectionError(e.to_string()))?;

        let database = Arc::new(database);
        let mut anchor = None;

        if is_memory {
            let anchor_conn = database
                .connect()
                .map_err(|e| DbError::ConnectionError(e.to_string()))?;
            apply_schema(&anchor_conn).await?;
            anchor = Some(Arc::new(anchor_conn));
            info!("in-memory database anchored and schema applied");
        } else {
            let bootstrap_conn = database
                .connect()
                .map_err(|e| DbError::ConnectionError(e.to_string()))?;
            apply_schema(&bootstrap_conn).await?;
        }

        Ok(Self {
            database,
            _memory_anchor: anchor,
        })
    }

    pub fn connection(&self) -> Result<Connection, DbError> {
        self.database
            .connect()
            .map_err(|e| DbError::ConnectionError(e.to_string()))
    }

    /// Cheapest possible liveness check: open a connection and run a no-op query.
    pub async fn ping(&self) -> bool {
        let Ok(conn) = self.connection() else {
            return false;
        };
        conn.query("SELECT 1", ()).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connects_and_bootstraps_in_memory() {
        let client = DbClient::connect(":memory:", None).await.unwrap();
        let conn = client.connection().unwrap();
        let mut rows = conn
            .query("SELECT COUNT(*) FROM user_state", ())
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        let count: i64 = row.get(0).unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn memory_anchor_keeps_schema_across_connections() {
        let client = DbClient::connect(":memory:", None).await.unwrap();
        let first = client.connection().unwrap();
        first
            .execute(
                "INSERT INTO user_state (user_id) VALUES ('anchor-test')",
                (),
            )
            .await
            .unwrap();
        drop(first);

        let second = client.connection().unwrap();
        let mut rows = second
            .query(
                "SELECT user_id FROM user_state WHERE user_id = 'anchor-test'",
                (),
            )
            .await
            .unwrap();
        assert!(rows.next().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn ping_succeeds_against_live_connection() {
        let client = DbClient::connect(":memory:", None).await.unwrap();
        assert!(client.ping().await);
    }

    #[tokio::test]
    async fn remote_url_without_token_is_rejected() {
        let err = DbClient::connect("libsql://example.turso.io", None)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::ConfigurationError(_)));
    }
}
