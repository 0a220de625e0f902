use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub system: SystemConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    pub workers: WorkersConfig,
    pub feed: FeedConfig,
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub sizing: SizingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemConfig {
    pub database_path: String,
}

/// Scoring constants the platform treats as tunable business rules rather
/// than hard-coded values.
#[derive(Debug, Clone, Deserialize)]
pub struct ScoringConfig {
    /// Added to an agent's average Brier before inversion, bounding the
    /// maximum reputation weight to 1/floor.
    #[serde(default = "default_weight_floor")]
    pub reputation_weight_floor: f64,
    /// Expected Brier of a constant-0.5 forecaster.
    #[serde(default = "default_random_baseline")]
    pub random_baseline_brier: f64,
    /// Number of fixed-width calibration buckets over [0, 1].
    #[serde(default = "default_bucket_count")]
    pub calibration_buckets: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkersConfig {
    pub resolution_sync_interval_secs: u64,
    pub market_sync_interval_secs: u64,
    pub resolved_fetch_limit: usize,
    pub market_fetch_limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    pub gamma_base_url: String,
    pub request_timeout_secs: u64,
    pub market_cache_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    pub csv_logging: bool,
    pub csv_log_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SizingConfig {
    #[serde(default = "default_profile")]
    pub default_profile: String,
}

fn default_weight_floor() -> f64 { 0.1 }
fn default_random_baseline() -> f64 { 0.25 }
fn default_bucket_count() -> usize { 10 }
fn default_profile() -> String { "balanced".to_string() }

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            reputation_weight_floor: default_weight_floor(),
            random_baseline_brier: default_random_baseline(),
            calibration_buckets: default_bucket_count(),
        }
    }
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self { default_profile: default_profile() }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path))?;

        Ok(config)
    }
}

#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub gamma_base_url: String,
    pub database_path: Option<String>,
}

impl EnvConfig {
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        Ok(Self {
            gamma_base_url: std::env::var("GAMMA_BASE_URL")
                .unwrap_or_else(|_| "https://gamma-api.polymarket.com".to_string()),
            database_path: std::env::var("QUORUM_DATABASE_PATH").ok(),
        })
    }
}
