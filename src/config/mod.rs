//! Environment-driven configuration for the ranking job.

use crate::domain::types::default_universe;
use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Which market-data provider backs the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Deterministic synthetic data; no network.
    Mock,
    /// Yahoo Finance chart + quote-summary endpoints.
    Yahoo,
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mock" => Ok(Mode::Mock),
            "yahoo" => Ok(Mode::Yahoo),
            _ => anyhow::bail!("Invalid MODE: {}. Must be 'mock' or 'yahoo'", s),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,

    /// Fixed instrument universe. No dynamic discovery.
    pub universe: Vec<String>,

    /// Trailing fetch window in calendar days (~1y of trading days).
    pub lookback_days: u32,

    /// Number of instruments published per snapshot.
    pub top_k: usize,

    /// Suggested holding period stored with each recommendation row.
    pub holding_period_days: u32,

    /// Directory holding model/scaler/schema/projector artifacts.
    pub artifact_dir: PathBuf,

    pub database_url: String,

    pub yahoo_base_url: String,

    /// Bounded fan-out for per-instrument fundamentals fetches.
    pub fundamentals_concurrency: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let mode = env_or("MODE", "yahoo").parse::<Mode>()?;

        let universe = match env::var("UNIVERSE") {
            Ok(raw) => {
                let symbols: Vec<String> = raw
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                anyhow::ensure!(!symbols.is_empty(), "UNIVERSE is set but empty");
                symbols
            }
            Err(_) => default_universe(),
        };

        Ok(Self {
            mode,
            universe,
            lookback_days: parse_env("LOOKBACK_DAYS", 365)?,
            top_k: parse_env("TOP_K", 10)?,
            holding_period_days: parse_env("HOLDING_PERIOD_DAYS", 5)?,
            artifact_dir: PathBuf::from(env_or("ARTIFACT_DIR", "model_artifacts")),
            database_url: env_or("DATABASE_URL", "sqlite://data/rankings.db"),
            yahoo_base_url: env_or("YAHOO_BASE_URL", "https://query1.finance.yahoo.com"),
            fundamentals_concurrency: parse_env("FUNDAMENTALS_CONCURRENCY", 8)?,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .with_context(|| format!("Invalid value for {}: {}", key, raw)),
        Err(_) => Ok(default),
    }
}
