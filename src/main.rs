use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use quorum::config::{Config, EnvConfig};
use quorum::data::cache::MarketCache;
use quorum::data::feed::GammaFeedClient;
use quorum::store::persistence::ForecastStore;
use quorum::strategies::types::StrategyProfile;
use quorum::workers;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    tracing::info!("🚀 Quorum scoring engine starting...");

    // Load configuration
    tracing::info!("Loading configuration...");
    let config = Config::load("config.toml")?;
    let env_config = EnvConfig::load()?;

    let db_path = env_config
        .database_path
        .unwrap_or_else(|| config.system.database_path.clone());

    let profile = StrategyProfile::from_name(&config.sizing.default_profile)
        .unwrap_or(StrategyProfile::Balanced);

    tracing::info!("Feed: {}", env_config.gamma_base_url);
    tracing::info!("Resolution sync interval: {}s", config.workers.resolution_sync_interval_secs);
    tracing::info!("Market sync interval: {}s", config.workers.market_sync_interval_secs);
    tracing::info!("Default sizing profile: {}", profile.as_str());

    // Initialize database
    tracing::info!("Initializing database: {}", db_path);
    let store = ForecastStore::new(&db_path)?;

    // Check database state
    let resolved = store.resolved_markets()?;
    tracing::info!("Resolved markets on record: {}", resolved.len());
    drop(store); // Workers open their own connections

    let feed = Arc::new(GammaFeedClient::new(
        env_config.gamma_base_url,
        config.feed.request_timeout_secs,
    )?);
    let cache = Arc::new(MarketCache::new(Duration::from_secs(
        config.feed.market_cache_ttl_secs,
    )));

    tokio::spawn(workers::market_sync::run_worker(
        db_path.clone(),
        Arc::clone(&feed),
        Arc::clone(&cache),
        config.clone(),
    ));

    tokio::spawn(workers::resolution_sync::run_worker(
        db_path,
        feed,
        config,
    ));

    tracing::info!("✅ Engine initialized, workers running");

    // Keep running
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down...");

    Ok(())
}
