use crate::domain::ports::{SnapshotStore, WriteOutcome};
use crate::domain::snapshot::{ExtraDisplayFields, RankingSnapshot, ScoredInstrument};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::{Row, SqlitePool};
use tracing::{info, warn};

pub struct SqliteSnapshotRepository {
    pool: SqlitePool,
}

impl SqliteSnapshotRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SnapshotStore for SqliteSnapshotRepository {
    async fn exists(&self, as_of: NaiveDate) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM daily_recommendations WHERE recommendation_date = ?",
        )
        .bind(as_of)
        .fetch_one(&self.pool)
        .await
        .context("Failed to check for existing snapshot")?;
        Ok(count > 0)
    }

    async fn write(&self, snapshot: &RankingSnapshot) -> Result<WriteOutcome> {
        let mut tx = self.pool.begin().await.context("Failed to open transaction")?;
        let created_at = Utc::now().timestamp();

        for entry in &snapshot.entries {
            let result = sqlx::query(
                r#"
                INSERT INTO daily_recommendations
                (ticker, recommendation_date, model_score, rank_position,
                 pe_ratio, market_cap, holding_period_days, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&entry.symbol)
            .bind(snapshot.as_of)
            .bind(entry.score)
            .bind(entry.rank as i64)
            .bind(entry.extra.pe_ratio)
            .bind(entry.extra.market_cap)
            .bind(snapshot.holding_period_days as i64)
            .bind(created_at)
            .execute(&mut *tx)
            .await;

            if let Err(e) = result {
                // A concurrent invocation already published this date. The
                // whole transaction rolls back; nothing partial survives.
                if let sqlx::Error::Database(db_err) = &e
                    && db_err.is_unique_violation()
                {
                    warn!(as_of = %snapshot.as_of, "Snapshot write lost the race; rolling back");
                    tx.rollback().await.ok();
                    return Ok(WriteOutcome::AlreadyExists);
                }
                return Err(anyhow::Error::from(e).context("Failed to insert recommendation row"));
            }
        }

        tx.commit().await.context("Failed to commit snapshot")?;
        info!(
            as_of = %snapshot.as_of,
            entries = snapshot.entries.len(),
            "Snapshot committed"
        );
        Ok(WriteOutcome::Written)
    }

    async fn latest(&self) -> Result<Option<RankingSnapshot>> {
        let latest_date: Option<NaiveDate> = sqlx::query_scalar(
            "SELECT MAX(recommendation_date) FROM daily_recommendations",
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to query latest snapshot date")?;

        let Some(as_of) = latest_date else {
            return Ok(None);
        };

        let rows = sqlx::query(
            r#"
            SELECT ticker, model_score, rank_position, pe_ratio, market_cap,
                   holding_period_days
            FROM daily_recommendations
            WHERE recommendation_date = ?
            ORDER BY rank_position ASC
            "#,
        )
        .bind(as_of)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load latest snapshot rows")?;

        let mut holding_period_days = 5u32;
        let entries = rows
            .iter()
            .map(|row| {
                holding_period_days = row.try_get::<i64, _>("holding_period_days")? as u32;
                Ok(ScoredInstrument {
                    symbol: row.try_get("ticker")?,
                    as_of,
                    score: row.try_get("model_score")?,
                    rank: row.try_get::<i64, _>("rank_position")? as u32,
                    extra: ExtraDisplayFields {
                        pe_ratio: row.try_get("pe_ratio")?,
                        market_cap: row.try_get("market_cap")?,
                    },
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(RankingSnapshot {
            as_of,
            entries,
            holding_period_days,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::database::Database;

    fn snapshot(as_of: NaiveDate, symbols: &[(&str, f64)]) -> RankingSnapshot {
        RankingSnapshot {
            as_of,
            entries: symbols
                .iter()
                .enumerate()
                .map(|(i, (s, score))| ScoredInstrument {
                    symbol: s.to_string(),
                    as_of,
                    score: *score,
                    rank: (i + 1) as u32,
                    extra: ExtraDisplayFields {
                        pe_ratio: Some(20.0),
                        market_cap: Some(1e9),
                    },
                })
                .collect(),
            holding_period_days: 5,
        }
    }

    async fn repo(dir: &tempfile::TempDir) -> SqliteSnapshotRepository {
        let url = format!("sqlite://{}/test.db", dir.path().display());
        let db = Database::new(&url).await.unwrap();
        SqliteSnapshotRepository::new(db.pool)
    }

    #[tokio::test]
    async fn test_write_then_duplicate_is_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo(&dir).await;
        let as_of = NaiveDate::from_ymd_opt(2024, 6, 28).unwrap();

        assert!(!repo.exists(as_of).await.unwrap());
        let outcome = repo
            .write(&snapshot(as_of, &[("NVDA", 0.9), ("MSFT", 0.7)]))
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Written);
        assert!(repo.exists(as_of).await.unwrap());

        // Second writer for the same date no-ops instead of duplicating.
        let outcome = repo
            .write(&snapshot(as_of, &[("NVDA", 0.9), ("MSFT", 0.7)]))
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::AlreadyExists);

        let loaded = repo.latest().await.unwrap().unwrap();
        assert_eq!(loaded.entries.len(), 2);
    }

    #[tokio::test]
    async fn test_latest_returns_most_recent_date_ordered_by_rank() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo(&dir).await;

        let older = NaiveDate::from_ymd_opt(2024, 6, 27).unwrap();
        let newer = NaiveDate::from_ymd_opt(2024, 6, 28).unwrap();
        repo.write(&snapshot(older, &[("OLD", 0.1)])).await.unwrap();
        repo.write(&snapshot(newer, &[("B", 0.5), ("A", 0.9)]))
            .await
            .unwrap();

        let latest = repo.latest().await.unwrap().unwrap();
        assert_eq!(latest.as_of, newer);
        assert_eq!(latest.entries[0].symbol, "B");
        assert_eq!(latest.entries[0].rank, 1);
        assert_eq!(latest.holding_period_days, 5);
    }

    #[tokio::test]
    async fn test_latest_on_empty_store_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo(&dir).await;
        assert!(repo.latest().await.unwrap().is_none());
    }
}
