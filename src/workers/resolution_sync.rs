use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::data::feed::GammaFeedClient;
use crate::data::types::Market;
use crate::error::EngineError;
use crate::monitoring::logger::CsvLogger;
use crate::scoring::reconciler;
use crate::store::persistence::ForecastStore;

/// Apply a batch of feed-reported resolutions to the store and score the
/// affected forecasts. Entries that are not actually resolved (or carry no
/// usable outcome) are skipped untouched, so a partially malformed batch
/// never corrupts local state.
pub fn apply_resolved_markets(
    store: &ForecastStore,
    markets: &[Market],
    csv: Option<&CsvLogger>,
) -> Result<usize, EngineError> {
    let mut total_scored = 0;

    for market in markets {
        let Some(outcome) = market.resolution_outcome.filter(|_| market.resolved) else {
            continue;
        };

        store.upsert_market(market)?;
        let transitioned =
            store.mark_market_resolved(&market.id, outcome, market.resolution_date)?;
        if transitioned {
            info!(market_id = %market.id, outcome, "marking market as resolved");
        }

        let pending = store.unscored_forecasts_for_market(&market.id)?;
        let stored = store
            .market(&market.id)?
            .ok_or_else(|| EngineError::MarketNotFound(market.id.clone()))?;

        let scored = reconciler::reconcile(store, &stored)?;
        total_scored += scored;

        if scored > 0 {
            if let Some(csv) = csv {
                log_scored(store, &pending, csv);
            }
        }
    }

    Ok(total_scored)
}

fn log_scored(store: &ForecastStore, pending: &[crate::data::types::Forecast], csv: &CsvLogger) {
    for forecast in pending {
        match store.forecast_for(&forecast.agent_id, &forecast.market_id) {
            Ok(Some(updated)) if updated.is_scored() => {
                if let Err(e) = csv.log_score(&updated) {
                    warn!("Failed to write score to CSV log: {}", e);
                }
            }
            Ok(_) => {}
            Err(e) => warn!("Failed to re-read forecast for CSV log: {}", e),
        }
    }
}

/// One sync pass: fetch recently resolved markets from the feed and score
/// everything they unlock.
pub async fn sync_resolved_markets(
    store: &ForecastStore,
    feed: &GammaFeedClient,
    limit: usize,
    csv: Option<&CsvLogger>,
) -> Result<usize, EngineError> {
    let markets = feed.fetch_resolved_markets(limit).await?;
    info!(fetched = markets.len(), "fetched resolved markets from feed");
    apply_resolved_markets(store, &markets, csv)
}

/// Run the resolution sync worker on a loop.
///
/// Each tick fetches resolved markets, reconciles them, then runs the
/// backfill sweep for forecasts submitted after their market resolved. A
/// failed tick is logged and skipped; local state is never left partially
/// resolved because every mutation is per-market and guarded.
pub async fn run_worker(db_path: String, feed: Arc<GammaFeedClient>, config: Config) {
    let store = match ForecastStore::new(&db_path) {
        Ok(store) => store,
        Err(e) => {
            error!("Resolution worker could not open store: {}", e);
            return;
        }
    };

    let csv = if config.monitoring.csv_logging {
        match CsvLogger::new(config.monitoring.csv_log_path.clone()) {
            Ok(logger) => Some(logger),
            Err(e) => {
                warn!("CSV logging disabled: {}", e);
                None
            }
        }
    } else {
        None
    };

    let interval = Duration::from_secs(config.workers.resolution_sync_interval_secs);
    info!(interval_secs = interval.as_secs(), "Starting resolution sync worker");

    loop {
        // Equivalent to `sync_resolved_markets`, but inlined so the non-Sync
        // `&store` borrow is never held across the fetch `.await` (keeps the
        // spawned worker future `Send`). Mirrors the market sync worker.
        match feed
            .fetch_resolved_markets(config.workers.resolved_fetch_limit)
            .await
        {
            Ok(markets) => {
                info!(fetched = markets.len(), "fetched resolved markets from feed");
                match apply_resolved_markets(&store, &markets, csv.as_ref()) {
                    Ok(scored) => info!(scored, "resolution sync tick complete"),
                    Err(e) => error!("Resolution sync tick failed: {}", e),
                }
            }
            // Upstream failures leave local state untouched; the next tick retries
            Err(e) => error!("Resolution sync tick failed: {}", e),
        }

        match reconciler::backfill(&store) {
            Ok(0) => {}
            Ok(scored) => info!(scored, "backfill sweep complete"),
            Err(e) => error!("Backfill sweep failed: {}", e),
        }

        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::types::ForecastSubmission;
    use chrono::Utc;

    fn market(id: &str, resolved: bool, outcome: Option<bool>) -> Market {
        Market {
            id: id.to_string(),
            question: format!("{}?", id),
            category: "other".to_string(),
            yes_price: 0.5,
            no_price: 0.5,
            volume_24h: 0.0,
            total_volume: 0.0,
            resolution_date: None,
            resolved,
            resolution_outcome: outcome,
            last_updated: Utc::now(),
        }
    }

    fn submit(store: &ForecastStore, agent: &str, market_id: &str, probability: f64) {
        store
            .submit_forecast(
                &ForecastSubmission {
                    agent_id: agent.to_string(),
                    market_id: market_id.to_string(),
                    probability,
                    confidence: "low".to_string(),
                    reasoning: None,
                },
                None,
            )
            .unwrap();
    }

    #[test]
    fn test_apply_scores_resolved_markets() {
        let store = ForecastStore::open_in_memory().unwrap();
        submit(&store, "alice", "mkt-1", 0.7);
        submit(&store, "bob", "mkt-2", 0.4);

        let batch = vec![
            market("mkt-1", true, Some(true)),
            market("mkt-2", true, Some(false)),
        ];

        assert_eq!(apply_resolved_markets(&store, &batch, None).unwrap(), 2);

        let alice = store.forecast_for("alice", "mkt-1").unwrap().unwrap();
        assert!((alice.brier_score.unwrap() - 0.09).abs() < 1e-9);
        let bob = store.forecast_for("bob", "mkt-2").unwrap().unwrap();
        assert!((bob.brier_score.unwrap() - 0.16).abs() < 1e-9);
    }

    #[test]
    fn test_malformed_batch_leaves_state_untouched() {
        let store = ForecastStore::open_in_memory().unwrap();
        submit(&store, "alice", "mkt-1", 0.7);

        // Feed reports the market closed but with no parseable outcome
        let bad_batch = vec![market("mkt-1", true, None)];
        assert_eq!(apply_resolved_markets(&store, &bad_batch, None).unwrap(), 0);

        let stored = store.market("mkt-1").unwrap();
        assert!(stored.is_none()); // never even upserted
        let forecast = store.forecast_for("alice", "mkt-1").unwrap().unwrap();
        assert!(!forecast.is_scored());

        // A later valid tick proceeds normally
        let good_batch = vec![market("mkt-1", true, Some(true))];
        assert_eq!(apply_resolved_markets(&store, &good_batch, None).unwrap(), 1);
        let forecast = store.forecast_for("alice", "mkt-1").unwrap().unwrap();
        assert!((forecast.brier_score.unwrap() - 0.09).abs() < 1e-9);
    }

    #[test]
    fn test_reapplying_batch_is_idempotent() {
        let store = ForecastStore::open_in_memory().unwrap();
        submit(&store, "alice", "mkt-1", 0.7);

        let batch = vec![market("mkt-1", true, Some(true))];
        assert_eq!(apply_resolved_markets(&store, &batch, None).unwrap(), 1);
        assert_eq!(apply_resolved_markets(&store, &batch, None).unwrap(), 0);
    }
}
