use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::ScoringConfig;
use crate::data::types::Forecast;
use crate::error::EngineError;
use crate::store::persistence::ForecastStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusSnapshot {
    pub market_id: String,
    pub consensus_probability: f64,
    /// Population standard deviation of the raw probabilities, a
    /// disagreement signal reported in both weighting modes.
    pub spread: f64,
    pub num_forecasters: usize,
    pub weighted_by_reputation: bool,
    pub calculated_at: DateTime<Utc>,
}

/// Reputation weight from an agent's historical average Brier.
///
/// Lower Brier means higher weight; the floor keeps a perfect-history agent
/// from blowing up the division (max weight = 1/floor). Agents with no
/// scored history get a neutral 1.0.
pub fn reputation_weight(avg_brier: Option<f64>, floor: f64) -> f64 {
    match avg_brier {
        Some(brier) => 1.0 / (brier + floor),
        None => 1.0,
    }
}

/// Aggregate a market's live forecasts into a single consensus estimate.
///
/// Recomputed from the current forecast set on every call; nothing is
/// cached, so additions, updates, and scores are reflected immediately.
pub fn consensus(
    market_id: &str,
    forecasts: &[Forecast],
    history: &HashMap<String, f64>,
    weighted: bool,
    scoring: &ScoringConfig,
) -> Result<ConsensusSnapshot, EngineError> {
    if forecasts.is_empty() {
        return Err(EngineError::NoForecasts(market_id.to_string()));
    }

    let probabilities: Vec<f64> = forecasts.iter().map(|f| f.probability).collect();

    let weights: Vec<f64> = if weighted {
        forecasts
            .iter()
            .map(|f| {
                reputation_weight(
                    history.get(&f.agent_id).copied(),
                    scoring.reputation_weight_floor,
                )
            })
            .collect()
    } else {
        vec![1.0; forecasts.len()]
    };

    let weight_sum: f64 = weights.iter().sum();
    let consensus_probability = probabilities
        .iter()
        .zip(&weights)
        .map(|(p, w)| p * w)
        .sum::<f64>()
        / weight_sum;

    Ok(ConsensusSnapshot {
        market_id: market_id.to_string(),
        consensus_probability,
        spread: population_std_dev(&probabilities),
        num_forecasters: forecasts.len(),
        weighted_by_reputation: weighted,
        calculated_at: Utc::now(),
    })
}

/// Store-backed consensus query: loads the market's live forecasts and each
/// agent's scored history, then delegates to the pure aggregation.
pub fn market_consensus(
    store: &ForecastStore,
    market_id: &str,
    weighted: bool,
    scoring: &ScoringConfig,
) -> Result<ConsensusSnapshot, EngineError> {
    let forecasts = store.forecasts_for_market(market_id)?;
    let history = if weighted {
        store.average_brier_by_agent()?
    } else {
        HashMap::new()
    };

    consensus(market_id, &forecasts, &history, weighted, scoring)
}

fn population_std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}
