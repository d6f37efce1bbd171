use std::collections::HashMap;
use std::time::Instant;

use libsql::params;
use orch_core::{Decision, SkillScores, UserState};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::client::DbClient;
use crate::error::DbError;

/// One row from the `orchestrator_decisions` audit log, as surfaced by the
/// admin-facing decisions endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionRecord {
    pub id: String,
    pub next_module: String,
    pub depth: i32,
    pub reason: String,
    pub created_at: String,
    pub input_snapshot: String,
}

/// Owns every read/write against `user_state`, `user_onboarding`, and
/// `orchestrator_decisions`. Reads degrade to defaults on partial failure;
/// writes to the audit log are best-effort and never propagate.
pub struct StateManager {
    db: DbClient,
}

impl StateManager {
    pub fn new(db: DbClient) -> Self {
        Self { db }
    }

    pub async fn db_is_reachable(&self) -> bool {
        self.db.ping().await
    }

    #[instrument(skip(self))]
    pub async fn get_user_state(&self, user_id: &str) -> UserState {
        let started = Instant::now();
        let mut state = UserState::new(user_id);

        if let Err(e) = self.ensure_user_state_row(user_id).await {
            warn!(user_id, error = %e, "failed to upsert default user_state row");
        }

        match self.read_scores(user_id).await {
            Ok(Some(scores)) => state.scores = scores,
            Ok(None) => {}
            Err(e) => warn!(user_id, error = %e, "failed to read user_state scores, using defaults"),
        }

        match self.read_next_module(user_id).await {
            Ok(v) => state.next_module = v,
            Err(e) => warn!(user_id, error = %e, "failed to read next_module"),
        }

        match self.read_onboarding(user_id).await {
            Ok((role, focus)) => {
                state.target_role = role;
                state.primary_focus = focus;
            }
            Err(e) => debug!(user_id, error = %e, "onboarding read unavailable, leaving unset"),
        }

        match self.get_decision_history(user_id, 10).await {
            Ok(decisions) => state.recent_modules = decisions,
            Err(e) => warn!(user_id, error = %e, "failed to read decision history"),
        }

        match self.module_visit_counts(user_id).await {
            Ok(counts) => state.module_visit_counts = counts,
            Err(e) => warn!(user_id, error = %e, "failed to compute module visit counts"),
        }

        debug!(user_id, elapsed_ms = started.elapsed().as_secs_f64() * 1000.0, "get_user_state complete");
        state
    }

    async fn ensure_user_state_row(&self, user_id: &str) -> Result<(), DbError> {
        let conn = self.db.connection()?;
        conn.execute(
            "INSERT INTO user_state (user_id) VALUES (?1) ON CONFLICT(user_id) DO NOTHING",
            params![user_id],
        )
        .await?;
        Ok(())
    }

    async fn read_scores(&self, user_id: &str) -> Result<Option<SkillScores>, DbError> {
        let conn = self.db.connection()?;
        let mut rows = conn
            .query(
                "SELECT clarity_avg, tradeoff_avg, adaptability_avg, failure_awareness_avg, dsa_predict_skill \
                 FROM user_state WHERE user_id = ?1",
                params![user_id],
            )
            .await?;
        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        Ok(Some(
            SkillScores {
                clarity_avg: row.get(0)?,
                tradeoff_avg: row.get(1)?,
                adaptability_avg: row.get(2)?,
                failure_awareness_avg: row.get(3)?,
                dsa_predict_skill: row.get(4)?,
            }
            .clamped(),
        ))
    }

    async fn read_next_module(&self, user_id: &str) -> Result<Option<String>, DbError> {
        let conn = self.db.connection()?;
        let mut rows = conn
            .query("SELECT next_module FROM user_state WHERE user_id = ?1", params![user_id])
            .await?;
        match rows.next().await? {
            Some(row) => Ok(row.get::<Option<String>>(0)?),
            None => Ok(None),
        }
    }

    async fn read_onboarding(&self, user_id: &str) -> Result<(Option<String>, Option<String>), DbError> {
        let conn = self.db.connection()?;
        let mut rows = conn
            .query(
                "SELECT target_role, primary_focus FROM user_onboarding WHERE user_id = ?1",
                params![user_id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok((row.get::<Option<String>>(0)?, row.get::<Option<String>>(1)?)),
            None => Ok((None, None)),
        }
    }

    async fn module_visit_counts(&self, user_id: &str) -> Result<HashMap<String, u64>, DbError> {
        let conn = self.db.connection()?;
        let mut rows = conn
            .query(
                "SELECT next_module, COUNT(*) FROM orchestrator_decisions \
                 WHERE user_id = ?1 GROUP BY next_module",
                params![user_id],
            )
            .await?;
        let mut counts = HashMap::new();
        while let Some(row) = rows.next().await? {
            let module: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            counts.insert(module, count as u64);
        }
        Ok(counts)
    }

    #[instrument(skip(self))]
    pub async fn update_next_module(&self, user_id: &str, module: &str) -> Result<(), DbError> {
        let conn = self.db.connection()?;
        conn.execute(
            "UPDATE user_state SET next_module = ?2, last_update = CURRENT_TIMESTAMP WHERE user_id = ?1",
            params![user_id, module],
        )
        .await?;
        Ok(())
    }

    /// Records a routing decision to the audit log. Failures are logged and
    /// swallowed; the audit trail is best-effort, never on the request's
    /// critical path.
    #[instrument(skip(self, decision))]
    pub async fn record_decision(&self, user_id: &str, decision: &Decision) -> Option<String> {
        let id = Uuid::new_v4().to_string();
        let snapshot = json!({
            "scores": decision.scores,
            "weakness_trigger": decision.weakness_trigger,
            "confidence": decision.confidence,
            "candidate_scores": decision.candidate_scores.iter().take(5).collect::<Vec<_>>(),
        });

        let result = async {
            let conn = self.db.connection()?;
            conn.execute(
                "INSERT INTO orchestrator_decisions (id, user_id, input_snapshot, next_module, depth, reason) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id.clone(),
                    user_id,
                    snapshot.to_string(),
                    decision.next_module.clone(),
                    decision.depth.as_i32(),
                    decision.reason.clone()
                ],
            )
            .await?;
            Ok::<(), DbError>(())
        }
        .await;

        match result {
            Ok(()) => Some(id),
            Err(e) => {
                warn!(user_id, error = %e, "failed to record decision audit entry");
                None
            }
        }
    }

    /// Latest decisions, most recent first.
    #[instrument(skip(self))]
    pub async fn get_decision_history(&self, user_id: &str, limit: u32) -> Result<Vec<String>, DbError> {
        let conn = self.db.connection()?;
        let mut rows = conn
            .query(
                "SELECT next_module FROM orchestrator_decisions \
                 WHERE user_id = ?1 ORDER BY created_at DESC LIMIT ?2",
                params![user_id, limit as i64],
            )
            .await?;
        let mut modules = Vec::new();
        while let Some(row) = rows.next().await? {
            modules.push(row.get(0)?);
        }
        Ok(modules)
    }

    /// Full audit rows for the admin decisions endpoint, most recent first.
    #[instrument(skip(self))]
    pub async fn list_decisions(&self, user_id: &str, limit: u32) -> Result<Vec<DecisionRecord>, DbError> {
        let conn = self.db.connection()?;
        let mut rows = conn
            .query(
                "SELECT id, next_module, depth, reason, created_at, input_snapshot \
                 FROM orchestrator_decisions WHERE user_id = ?1 ORDER BY created_at DESC LIMIT ?2",
                params![user_id, limit as i64],
            )
            .await?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(DecisionRecord {
                id: row.get(0)?,
                next_module: row.get(1)?,
                depth: row.get(2)?,
                reason: row.get(3)?,
                created_at: row.get(4)?,
                input_snapshot: row.get(5)?,
            });
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orch_core::DecisionDepth;

    async fn manager() -> StateManager {
        let db = DbClient::connect(":memory:", None).await.unwrap();
        StateManager::new(db)
    }

    #[tokio::test]
    async fn new_user_gets_default_scores() {
        let mgr = manager().await;
        let state = mgr.get_user_state("fresh-user").await;
        assert_eq!(state.scores, SkillScores::default());
        assert!(state.recent_modules.is_empty());
    }

    #[tokio::test]
    async fn out_of_range_score_written_by_a_bad_llm_response_is_clamped_on_read() {
        let mgr = manager().await;
        mgr.get_user_state("u-bad-score").await;
        let conn = mgr.db.connection().unwrap();
        conn.execute(
            "UPDATE user_state SET clarity_avg = 1.4, tradeoff_avg = -0.3 WHERE user_id = ?1",
            params!["u-bad-score"],
        )
        .await
        .unwrap();

        let state = mgr.get_user_state("u-bad-score").await;
        assert_eq!(state.scores.clarity_avg, 1.0);
        assert_eq!(state.scores.tradeoff_avg, 0.0);
    }

    #[tokio::test]
    async fn update_next_module_persists() {
        let mgr = manager().await;
        mgr.get_user_state("u1").await;
        mgr.update_next_module("u1", "dsa_practice").await.unwrap();
        let state = mgr.get_user_state("u1").await;
        assert_eq!(state.next_module.as_deref(), Some("dsa_practice"));
    }

    #[tokio::test]
    async fn record_and_read_decision_history() {
        let mgr = manager().await;
        let decision = Decision {
            next_module: "dsa_practice".to_string(),
            reason: "test".to_string(),
            rule_reason: "test".to_string(),
            description: "test".to_string(),
            depth: DecisionDepth::Normal,
            weakness_trigger: None,
            scores: SkillScores::default(),
            confidence: 0.8,
            candidate_scores: Vec::new(),
            decision_id: None,
        };
        let id = mgr.record_decision("u2", &decision).await;
        assert!(id.is_some());

        let history = mgr.get_decision_history("u2", 10).await.unwrap();
        assert_eq!(history, vec!["dsa_practice".to_string()]);
    }

    #[tokio::test]
    async fn list_decisions_returns_full_audit_rows() {
        let mgr = manager().await;
        let decision = Decision {
            next_module: "dsa_practice".to_string(),
            reason: "test reason".to_string(),
            rule_reason: "test reason".to_string(),
            description: "test".to_string(),
            depth: DecisionDepth::Critical,
            weakness_trigger: Some("clarity_avg".to_string()),
            scores: SkillScores::default(),
            confidence: 0.8,
            candidate_scores: Vec::new(),
            decision_id: None,
        };
        mgr.record_decision("u4", &decision).await;

        let records = mgr.list_decisions("u4", 10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].next_module, "dsa_practice");
        assert_eq!(records[0].depth, DecisionDepth::Critical.as_i32());
        assert_eq!(records[0].reason, "test reason");
    }

    #[tokio::test]
    async fn module_visit_counts_reflect_decision_history() {
        let mgr = manager().await;
        let decision = Decision {
            next_module: "resume_builder".to_string(),
            reason: "test".to_string(),
            rule_reason: "test".to_string(),
            description: "test".to_string(),
            depth: DecisionDepth::Normal,
            weakness_trigger: None,
            scores: SkillScores::default(),
            confidence: 0.8,
            candidate_scores: Vec::new(),
            decision_id: None,
        };
        mgr.record_decision("u3", &decision).await;
        mgr.record_decision("u3", &decision).await;

        let state = mgr.get_user_state("u3").await;
        assert_eq!(state.module_visit_counts.get("resume_builder"), Some(&2));
    }
}
