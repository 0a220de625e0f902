use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::data::types::Market;
use crate::error::EngineError;
use crate::scoring::brier::brier_score;
use crate::store::persistence::ForecastStore;

/// Score every still-unscored forecast on a resolved market.
///
/// Safe to re-run: scored forecasts are filtered out by the store's
/// unset-score guard, so a second pass (or a pass resuming after a partial
/// failure) stamps only what the previous one missed. Returns the number of
/// forecasts newly scored.
pub fn reconcile(store: &ForecastStore, market: &Market) -> Result<usize, EngineError> {
    if !market.resolved {
        return Err(EngineError::UnresolvedMarket(market.id.clone()));
    }
    let outcome = market
        .resolution_outcome
        .ok_or_else(|| EngineError::UnresolvedMarket(market.id.clone()))?;

    let unscored = store.unscored_forecasts_for_market(&market.id)?;
    if unscored.is_empty() {
        return Ok(0);
    }

    let mut scores = Vec::with_capacity(unscored.len());
    for forecast in &unscored {
        if let Some(id) = forecast.id {
            scores.push((id, brier_score(forecast.probability, outcome)?));
        }
    }

    let stamped = store.apply_scores(outcome, &scores)?;
    if stamped > 0 {
        info!(
            market_id = %market.id,
            outcome,
            scored = stamped,
            "scored forecasts for resolved market"
        );
    }

    Ok(stamped)
}

/// Record a market resolution and immediately score its forecasts — the
/// triggered mode of the reconciler.
pub fn resolve_and_reconcile(
    store: &ForecastStore,
    market_id: &str,
    outcome: bool,
    resolution_date: Option<DateTime<Utc>>,
) -> Result<usize, EngineError> {
    store.mark_market_resolved(market_id, outcome, resolution_date)?;

    let market = store
        .market(market_id)?
        .ok_or_else(|| EngineError::MarketNotFound(market_id.to_string()))?;

    reconcile(store, &market)
}

/// Periodic full-sweep mode: scan every resolved market for forecasts the
/// triggered path missed (late submissions, transient failures).
pub fn backfill(store: &ForecastStore) -> Result<usize, EngineError> {
    let resolved = store.resolved_markets()?;
    debug!(markets = resolved.len(), "running scoring backfill sweep");

    let mut total = 0;
    for market in &resolved {
        let stamped = reconcile(store, market)?;
        if stamped > 0 {
            info!(market_id = %market.id, scored = stamped, "backfilled forecast scores");
        }
        total += stamped;
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::types::ForecastSubmission;

    fn submit(store: &ForecastStore, agent: &str, market: &str, probability: f64) {
        store
            .submit_forecast(
                &ForecastSubmission {
                    agent_id: agent.to_string(),
                    market_id: market.to_string(),
                    probability,
                    confidence: "high".to_string(),
                    reasoning: None,
                },
                Some(0.5),
            )
            .unwrap();
    }

    #[test]
    fn test_resolve_scores_forecast() {
        let store = ForecastStore::open_in_memory().unwrap();
        submit(&store, "alice", "mkt-1", 0.7);

        let scored = resolve_and_reconcile(&store, "mkt-1", true, None).unwrap();
        assert_eq!(scored, 1);

        let forecast = store.forecast_for("alice", "mkt-1").unwrap().unwrap();
        assert_eq!(forecast.outcome, Some(true));
        // (0.7 - 1.0)^2 exactly
        assert!((forecast.brier_score.unwrap() - 0.09).abs() < 1e-9);
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let store = ForecastStore::open_in_memory().unwrap();
        submit(&store, "alice", "mkt-1", 0.7);
        submit(&store, "bob", "mkt-1", 0.4);

        assert_eq!(resolve_and_reconcile(&store, "mkt-1", true, None).unwrap(), 2);

        let market = store.market("mkt-1").unwrap().unwrap();
        let before = store.forecasts_for_market("mkt-1").unwrap();

        // Second pass scores nothing and changes nothing
        assert_eq!(reconcile(&store, &market).unwrap(), 0);
        let after = store.forecasts_for_market("mkt-1").unwrap();
        for (a, b) in before.iter().zip(&after) {
            assert_eq!(a.brier_score, b.brier_score);
            assert_eq!(a.outcome, b.outcome);
        }
    }

    #[test]
    fn test_resubmission_then_resolution() {
        let store = ForecastStore::open_in_memory().unwrap();
        submit(&store, "alice", "mkt-1", 0.3);
        submit(&store, "alice", "mkt-1", 0.8);

        assert_eq!(resolve_and_reconcile(&store, "mkt-1", true, None).unwrap(), 1);

        let forecasts = store.forecasts_for_market("mkt-1").unwrap();
        assert_eq!(forecasts.len(), 1);
        // Scored against the resubmitted probability: (0.8 - 1.0)^2
        assert!((forecasts[0].brier_score.unwrap() - 0.04).abs() < 1e-9);
    }

    #[test]
    fn test_reconcile_requires_resolution() {
        let store = ForecastStore::open_in_memory().unwrap();
        submit(&store, "alice", "mkt-1", 0.7);

        let market = Market {
            id: "mkt-1".to_string(),
            question: String::new(),
            category: "other".to_string(),
            yes_price: 0.5,
            no_price: 0.5,
            volume_24h: 0.0,
            total_volume: 0.0,
            resolution_date: None,
            resolved: false,
            resolution_outcome: None,
            last_updated: Utc::now(),
        };

        assert!(matches!(
            reconcile(&store, &market),
            Err(EngineError::UnresolvedMarket(_))
        ));
        // Nothing was stamped
        let forecast = store.forecast_for("alice", "mkt-1").unwrap().unwrap();
        assert!(!forecast.is_scored());
    }

    #[test]
    fn test_backfill_catches_late_forecast() {
        let store = ForecastStore::open_in_memory().unwrap();

        // Market resolves before anyone forecast it
        assert_eq!(resolve_and_reconcile(&store, "mkt-1", false, None).unwrap(), 0);

        // A forecast arrives late, then the periodic sweep picks it up
        submit(&store, "alice", "mkt-1", 0.1);
        assert_eq!(backfill(&store).unwrap(), 1);

        let forecast = store.forecast_for("alice", "mkt-1").unwrap().unwrap();
        assert_eq!(forecast.outcome, Some(false));
        // (0.1 - 0.0)^2
        assert!((forecast.brier_score.unwrap() - 0.01).abs() < 1e-9);

        // Sweep is idempotent too
        assert_eq!(backfill(&store).unwrap(), 0);
    }
}
