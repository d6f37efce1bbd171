use libsql::params;
use tracing::instrument;
use uuid::Uuid;

use crate::client::DbClient;
use crate::error::DbError;

/// Parsed per-dimension scores from an LLM evaluation. Any dimension may be
/// absent when the LLM omitted it or parsing failed entirely.
#[derive(Debug, Clone, Default)]
pub struct ParsedScores {
    pub clarity: Option<f64>,
    pub tradeoffs: Option<f64>,
    pub adaptability: Option<f64>,
    pub failure_awareness: Option<f64>,
    pub dsa_predict: Option<f64>,
}

/// Append-only writes backing the evaluator pipeline: one interaction row
/// per call, one scores row per call.
pub struct EvaluatorStore {
    db: DbClient,
}

impl EvaluatorStore {
    pub fn new(db: DbClient) -> Self {
        Self { db }
    }

    #[instrument(skip(self, question, answer))]
    pub async fn insert_interaction(
        &self,
        user_id: &str,
        module: &str,
        question: &str,
        answer: &str,
    ) -> Result<String, DbError> {
        let id = Uuid::new_v4().to_string();
        let conn = self.db.connection()?;
        conn.execute(
            "INSERT INTO interactions (id, user_id, module, step_type, question, user_answer) \
             VALUES (?1, ?2, ?3, 'core', ?4, ?5)",
            params![id.clone(), user_id, module, question, answer],
        )
        .await?;
        Ok(id)
    }

    #[instrument(skip(self, scores))]
    pub async fn insert_scores(
        &self,
        user_id: &str,
        module: &str,
        scores: &ParsedScores,
    ) -> Result<String, DbError> {
        let id = Uuid::new_v4().to_string();
        let conn = self.db.connection()?;
        conn.execute(
            "INSERT INTO scores (id, user_id, module, clarity, tradeoffs, adaptability, failure_awareness, dsa_predict) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                id.clone(),
                user_id,
                module,
                scores.clarity,
                scores.tradeoffs,
                scores.adaptability,
                scores.failure_awareness,
                scores.dsa_predict
            ],
        )
        .await?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> EvaluatorStore {
        let db = DbClient::connect(":memory:", None).await.unwrap();
        EvaluatorStore::new(db)
    }

    #[tokio::test]
    async fn insert_interaction_roundtrips() {
        let store = store().await;
        let id = store
            .insert_interaction("u1", "production_interview", "why shard?", "to scale writes")
            .await
            .unwrap();
        assert!(!id.is_empty());
    }

    #[tokio::test]
    async fn insert_scores_allows_partial_nulls() {
        let store = store().await;
        let scores = ParsedScores {
            clarity: Some(0.8),
            tradeoffs: None,
            adaptability: Some(0.6),
            failure_awareness: None,
            dsa_predict: None,
        };
        let id = store.insert_scores("u1", "production_interview", &scores).await.unwrap();
        assert!(!id.is_empty());
    }

    #[tokio::test]
    async fn total_failure_writes_all_null_scores() {
        let store = store().await;
        let scores = ParsedScores::default();
        let id = store.insert_scores("u2", "dsa_practice", &scores).await.unwrap();
        assert!(!id.is_empty());
    }
}
