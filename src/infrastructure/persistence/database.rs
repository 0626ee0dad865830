use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tokio::fs;
use tracing::info;

/// SQLite connection pool plus schema bootstrap for recommendation storage.
#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn new(db_url: &str) -> Result<Self> {
        if let Some(path_part) = db_url.strip_prefix("sqlite://") {
            let path = Path::new(path_part);
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
                && !parent.exists()
            {
                fs::create_dir_all(parent)
                    .await
                    .context("Failed to create database directory")?;
            }
        }

        let options = SqliteConnectOptions::from_str(db_url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        info!("Connected to database: {}", db_url);

        let db = Self { pool };
        db.init().await?;
        Ok(db)
    }

    /// The uniqueness constraint on (ticker, recommendation_date) is what
    /// makes concurrent publishes safe: the second writer's transaction
    /// fails as a unit and is reported as an idempotent skip.
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS daily_recommendations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ticker TEXT NOT NULL,
                recommendation_date TEXT NOT NULL,
                model_score REAL NOT NULL,
                rank_position INTEGER NOT NULL,
                pe_ratio REAL,
                market_cap REAL,
                holding_period_days INTEGER NOT NULL DEFAULT 5,
                created_at INTEGER NOT NULL,
                UNIQUE (ticker, recommendation_date)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create daily_recommendations table")?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_recommendations_date
            ON daily_recommendations (recommendation_date);
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create recommendation date index")?;

        Ok(())
    }
}
