use libsql::params;
use tracing::{instrument, warn};

use crate::client::DbClient;
use crate::error::DbError;

/// Recomputes `user_state`'s per-dimension averages from the `scores` table.
///
/// `AVG()` ignores nulls, so a dimension with no evaluations yet keeps its
/// current value via `COALESCE` — this is what makes the aggregation
/// idempotent when called with no new scores since the last run.
pub struct Aggregator {
    db: DbClient,
}

impl Aggregator {
    pub fn new(db: DbClient) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn update_user_state(&self, user_id: &str) -> Result<(), DbError> {
        let conn = self.db.connection()?;

        conn.execute(
            "INSERT INTO user_state (user_id) VALUES (?1) ON CONFLICT(user_id) DO NOTHING",
            params![user_id],
        )
        .await?;

        let result = conn
            .execute(
                "UPDATE user_state SET
                    clarity_avg = COALESCE(sub.c, user_state.clarity_avg),
                    tradeoff_avg = COALESCE(sub.t, user_state.tradeoff_avg),
                    adaptability_avg = COALESCE(sub.a, user_state.adaptability_avg),
                    failure_awareness_avg = COALESCE(sub.f, user_state.failure_awareness_avg),
                    dsa_predict_skill = COALESCE(sub.d, user_state.dsa_predict_skill),
                    last_update = CURRENT_TIMESTAMP
                 FROM (
                    SELECT user_id,
                           AVG(clarity) AS c,
                           AVG(tradeoffs) AS t,
                           AVG(adaptability) AS a,
                           AVG(failure_awareness) AS f,
                           AVG(dsa_predict) AS d
                    FROM scores WHERE user_id = ?1 GROUP BY user_id
                 ) AS sub
                 WHERE user_state.user_id = sub.user_id",
                params![user_id],
            )
            .await;

        if let Err(e) = &result {
            warn!(user_id, error = %e, "aggregation update failed");
        }
        result.map(|_| ()).map_err(DbError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::apply_schema;
    use proptest::prelude::*;

    async fn aggregator() -> (Aggregator, DbClient) {
        let db = DbClient::connect(":memory:", None).await.unwrap();
        (Aggregator::new(db.clone()), db)
    }

    async fn insert_score(
        db: &DbClient,
        id: &str,
        user_id: &str,
        clarity: Option<f64>,
        tradeoffs: Option<f64>,
        adaptability: Option<f64>,
        failure_awareness: Option<f64>,
        dsa_predict: Option<f64>,
    ) {
        let conn = db.connection().unwrap();
        conn.execute(
            "INSERT INTO scores (id, user_id, module, clarity, tradeoffs, adaptability, failure_awareness, dsa_predict) \
             VALUES (?1, ?2, 'production_interview', ?3, ?4, ?5, ?6, ?7)",
            params![id, user_id, clarity, tradeoffs, adaptability, failure_awareness, dsa_predict],
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn averages_ignore_nulls_across_two_rows() {
        let (agg, db) = aggregator().await;
        insert_score(&db, "s1", "u1", Some(0.6), Some(0.5), None, Some(0.4), None).await;
        insert_score(&db, "s2", "u1", Some(0.8), None, Some(0.7), Some(0.6), Some(0.9)).await;

        agg.update_user_state("u1").await.unwrap();

        let conn = db.connection().unwrap();
        let mut rows = conn
            .query(
                "SELECT clarity_avg, tradeoff_avg, adaptability_avg, failure_awareness_avg, dsa_predict_skill \
                 FROM user_state WHERE user_id = 'u1'",
                (),
            )
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        let clarity: f64 = row.get(0).unwrap();
        let tradeoff: f64 = row.get(1).unwrap();
        let adaptability: f64 = row.get(2).unwrap();
        let failure: f64 = row.get(3).unwrap();
        let dsa: f64 = row.get(4).unwrap();

        assert!((clarity - 0.7).abs() < 1e-9);
        assert!((tradeoff - 0.5).abs() < 1e-9);
        assert!((adaptability - 0.7).abs() < 1e-9);
        assert!((failure - 0.5).abs() < 1e-9);
        assert!((dsa - 0.9).abs() < 1e-9);
    }

    #[tokio::test]
    async fn calling_again_with_no_new_scores_is_idempotent() {
        let (agg, db) = aggregator().await;
        insert_score(&db, "s1", "u2", Some(0.5), Some(0.5), Some(0.5), Some(0.5), Some(0.5)).await;

        agg.update_user_state("u2").await.unwrap();
        let conn = db.connection().unwrap();
        let read = || async {
            let mut rows = conn
                .query("SELECT clarity_avg FROM user_state WHERE user_id = 'u2'", ())
                .await
                .unwrap();
            let row = rows.next().await.unwrap().unwrap();
            row.get::<f64>(0).unwrap()
        };
        let first = read().await;
        agg.update_user_state("u2").await.unwrap();
        let second = read().await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn no_scores_leaves_defaults_unchanged() {
        let (agg, db) = aggregator().await;
        agg.update_user_state("u3").await.unwrap();
        let conn = db.connection().unwrap();
        let mut rows = conn
            .query("SELECT clarity_avg FROM user_state WHERE user_id = 'u3'", ())
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        let clarity: f64 = row.get(0).unwrap();
        assert_eq!(clarity, 1.0);
    }

    fn block_on<F: std::future::Future>(f: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
    }

    proptest::proptest! {
        /// Re-running aggregation with no new scores inserted between calls
        /// never changes the stored averages, for any single inserted score.
        #[test]
        fn aggregation_with_no_new_scores_is_idempotent(
            clarity in 0.0f64..=1.0,
            tradeoffs in 0.0f64..=1.0,
            adaptability in 0.0f64..=1.0,
            failure_awareness in 0.0f64..=1.0,
            dsa_predict in 0.0f64..=1.0,
        ) {
            block_on(async {
                let (agg, db) = aggregator().await;
                insert_score(
                    &db,
                    "s-prop",
                    "u-prop",
                    Some(clarity),
                    Some(tradeoffs),
                    Some(adaptability),
                    Some(failure_awareness),
                    Some(dsa_predict),
                )
                .await;

                agg.update_user_state("u-prop").await.unwrap();
                let conn = db.connection().unwrap();
                let read = || async {
                    let mut rows = conn
                        .query(
                            "SELECT clarity_avg, tradeoff_avg, adaptability_avg, failure_awareness_avg, dsa_predict_skill \
                             FROM user_state WHERE user_id = 'u-prop'",
                            (),
                        )
                        .await
                        .unwrap();
                    let row = rows.next().await.unwrap().unwrap();
                    (
                        row.get::<f64>(0).unwrap(),
                        row.get::<f64>(1).unwrap(),
                        row.get::<f64>(2).unwrap(),
                        row.get::<f64>(3).unwrap(),
                        row.get::<f64>(4).unwrap(),
                    )
                };

                let first = read().await;
                agg.update_user_state("u-prop").await.unwrap();
                let second = read().await;
                prop_assert_eq!(first, second);
                Ok(())
            })?;
        }
    }
}
