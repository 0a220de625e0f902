use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ScoringConfig;
use crate::error::EngineError;
use crate::scoring::brier::{calibration, CalibrationBucket};
use crate::store::persistence::ForecastStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub agent_id: String,
    pub total_resolved_forecasts: usize,
    pub average_brier_score: Option<f64>,
    pub calibration_error: Option<f64>,
    pub buckets: Vec<CalibrationBucket>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkEntry {
    pub rank: usize,
    pub agent_id: String,
    pub display_name: String,
    pub brier_score: f64,
    pub resolved_forecasts: usize,
    pub calibration_error: Option<f64>,
    pub beat_market_rate: Option<f64>,
    /// Improvement over the random baseline; positive beats a constant-0.5
    /// forecaster.
    pub vs_random: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub calculated_at: DateTime<Utc>,
    pub total_agents: usize,
    pub total_resolved_forecasts: usize,
    pub random_baseline_brier: f64,
    pub rankings: Vec<BenchmarkEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketComparison {
    pub agent_id: String,
    pub total_comparable: usize,
    pub beat_market_count: usize,
    pub beat_market_rate: Option<f64>,
    pub average_agent_brier: Option<f64>,
    pub average_market_brier: Option<f64>,
}

/// Calibration analysis over an agent's scored history.
///
/// An agent with nothing scored yet gets an empty report, not an error.
pub fn agent_calibration(
    store: &ForecastStore,
    agent_id: &str,
    scoring: &ScoringConfig,
) -> Result<CalibrationReport, EngineError> {
    let scored = store.scored_forecasts_for_agent(agent_id)?;

    let pairs: Vec<(f64, bool)> = scored
        .iter()
        .filter_map(|f| f.outcome.map(|o| (f.probability, o)))
        .collect();

    let briers: Vec<f64> = scored.iter().filter_map(|f| f.brier_score).collect();
    let average_brier_score = if briers.is_empty() {
        None
    } else {
        Some(briers.iter().sum::<f64>() / briers.len() as f64)
    };

    let (calibration_error, buckets) = calibration(&pairs, scoring.calibration_buckets);

    Ok(CalibrationReport {
        agent_id: agent_id.to_string(),
        total_resolved_forecasts: scored.len(),
        average_brier_score,
        calibration_error,
        buckets,
    })
}

/// Did the agent's forecasts beat the Brier score implied by quoting the
/// market's own price at forecast time? Only scored forecasts with a
/// recorded price are comparable; beating requires a strictly lower Brier.
pub fn market_price_comparison(
    store: &ForecastStore,
    agent_id: &str,
) -> Result<MarketComparison, EngineError> {
    let scored = store.scored_forecasts_for_agent(agent_id)?;

    let mut comparable = 0usize;
    let mut beat = 0usize;
    let mut agent_brier_sum = 0.0;
    let mut market_brier_sum = 0.0;

    for forecast in &scored {
        let (Some(price), Some(agent_brier), Some(outcome)) = (
            forecast.market_price_at_forecast,
            forecast.brier_score,
            forecast.outcome,
        ) else {
            continue;
        };

        let outcome_value = if outcome { 1.0 } else { 0.0 };
        let market_brier = (price - outcome_value).powi(2);

        comparable += 1;
        agent_brier_sum += agent_brier;
        market_brier_sum += market_brier;
        if agent_brier < market_brier {
            beat += 1;
        }
    }

    let rate_denominator = comparable as f64;
    Ok(MarketComparison {
        agent_id: agent_id.to_string(),
        total_comparable: comparable,
        beat_market_count: beat,
        beat_market_rate: (comparable > 0).then(|| beat as f64 / rate_denominator),
        average_agent_brier: (comparable > 0).then(|| agent_brier_sum / rate_denominator),
        average_market_brier: (comparable > 0).then(|| market_brier_sum / rate_denominator),
    })
}

/// Rank all agents with scored history by average Brier (ascending — lower
/// is strictly better). The sort is stable, so Brier ties keep agent
/// registration order; ranks are 1-based positions after the sort.
pub fn benchmark_ranking(
    store: &ForecastStore,
    limit: usize,
    scoring: &ScoringConfig,
) -> Result<BenchmarkReport, EngineError> {
    let mut entries = Vec::new();
    let mut total_resolved = 0usize;

    for agent in store.agents()? {
        let scored = store.scored_forecasts_for_agent(&agent.agent_id)?;
        if scored.is_empty() {
            continue;
        }

        let resolved_forecasts = scored.len();
        total_resolved += resolved_forecasts;

        let briers: Vec<f64> = scored.iter().filter_map(|f| f.brier_score).collect();
        let avg_brier = briers.iter().sum::<f64>() / resolved_forecasts as f64;

        let report = agent_calibration(store, &agent.agent_id, scoring)?;
        let comparison = market_price_comparison(store, &agent.agent_id)?;

        entries.push(BenchmarkEntry {
            rank: 0,
            agent_id: agent.agent_id,
            display_name: agent.display_name,
            brier_score: avg_brier,
            resolved_forecasts,
            calibration_error: report.calibration_error,
            beat_market_rate: comparison.beat_market_rate,
            vs_random: scoring.random_baseline_brier - avg_brier,
        });
    }

    let total_agents = entries.len();
    entries.sort_by(|a, b| a.brier_score.total_cmp(&b.brier_score));
    entries.truncate(limit);
    for (i, entry) in entries.iter_mut().enumerate() {
        entry.rank = i + 1;
    }

    Ok(BenchmarkReport {
        calculated_at: Utc::now(),
        total_agents,
        total_resolved_forecasts: total_resolved,
        random_baseline_brier: scoring.random_baseline_brier,
        rankings: entries,
    })
}
