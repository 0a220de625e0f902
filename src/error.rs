use thiserror::Error;

/// Engine-wide error type.
///
/// Validation and not-found variants are returned to callers for
/// translation into user-facing responses. Upstream and inconsistent-state
/// variants are logged by the workers and never crash the process.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Probability {0} outside [0, 1]")]
    InvalidProbability(f64),

    #[error("Unknown confidence level: {0} (expected high, medium, or low)")]
    InvalidConfidence(String),

    #[error("Forecast for (agent {agent_id}, market {market_id}) is already scored")]
    ForecastAlreadyScored { agent_id: String, market_id: String },

    #[error("No forecasts found for market '{0}'")]
    NoForecasts(String),

    #[error("Market '{0}' not found")]
    MarketNotFound(String),

    #[error("Market '{0}' is not resolved")]
    UnresolvedMarket(String),

    #[error("Upstream feed error: {0}")]
    Upstream(String),

    #[error("Forecast {forecast_id} has outcome set without brier score (or vice versa)")]
    InconsistentForecast { forecast_id: i64 },

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}
