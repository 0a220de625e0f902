use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::config::Config;
use crate::data::cache::MarketCache;
use crate::data::feed::GammaFeedClient;
use crate::data::types::Market;
use crate::error::EngineError;
use crate::store::persistence::ForecastStore;

/// Refresh stored market rows and the in-memory snapshot cache from a feed
/// batch. Resolution state is deliberately not touched here; that belongs
/// to the resolution sync worker.
pub fn apply_market_snapshots(
    store: &ForecastStore,
    cache: &MarketCache,
    markets: Vec<Market>,
) -> Result<usize, EngineError> {
    let count = markets.len();
    for market in markets {
        store.upsert_market(&market)?;
        cache.insert(market);
    }
    Ok(count)
}

/// Run the market sync worker on a loop, keeping prices fresh so forecast
/// submissions can stamp `market_price_at_forecast`.
pub async fn run_worker(
    db_path: String,
    feed: Arc<GammaFeedClient>,
    cache: Arc<MarketCache>,
    config: Config,
) {
    let store = match ForecastStore::new(&db_path) {
        Ok(store) => store,
        Err(e) => {
            error!("Market sync worker could not open store: {}", e);
            return;
        }
    };

    let interval = Duration::from_secs(config.workers.market_sync_interval_secs);
    info!(interval_secs = interval.as_secs(), "Starting market sync worker");

    loop {
        match feed.fetch_markets(config.workers.market_fetch_limit).await {
            Ok(markets) => match apply_market_snapshots(&store, &cache, markets) {
                Ok(count) => info!(markets = count, "market sync tick complete"),
                Err(e) => error!("Market sync store update failed: {}", e),
            },
            Err(e) => error!("Market sync fetch failed: {}", e),
        }

        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn market(id: &str, yes_price: f64) -> Market {
        Market {
            id: id.to_string(),
            question: format!("{}?", id),
            category: "other".to_string(),
            yes_price,
            no_price: 1.0 - yes_price,
            volume_24h: 100.0,
            total_volume: 1000.0,
            resolution_date: None,
            resolved: false,
            resolution_outcome: None,
            last_updated: Utc::now(),
        }
    }

    #[test]
    fn test_apply_snapshots_updates_store_and_cache() {
        let store = ForecastStore::open_in_memory().unwrap();
        let cache = MarketCache::new(Duration::from_secs(60));

        let applied =
            apply_market_snapshots(&store, &cache, vec![market("mkt-1", 0.62), market("mkt-2", 0.3)])
                .unwrap();
        assert_eq!(applied, 2);

        assert_eq!(cache.yes_price("mkt-1"), Some(0.62));
        let stored = store.market("mkt-2").unwrap().unwrap();
        assert!((stored.yes_price - 0.3).abs() < 1e-9);

        // A later snapshot refreshes the price
        apply_market_snapshots(&store, &cache, vec![market("mkt-1", 0.70)]).unwrap();
        assert_eq!(cache.yes_price("mkt-1"), Some(0.70));
    }
}
