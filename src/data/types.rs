use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub id: String,
    pub question: String,
    pub category: String,
    pub yes_price: f64,
    pub no_price: f64,
    pub volume_24h: f64,
    pub total_volume: f64,
    pub resolution_date: Option<DateTime<Utc>>,
    pub resolved: bool,
    pub resolution_outcome: Option<bool>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        }
    }

    pub fn parse(s: &str) -> Result<Self, EngineError> {
        match s {
            "high" => Ok(Confidence::High),
            "medium" => Ok(Confidence::Medium),
            "low" => Ok(Confidence::Low),
            other => Err(EngineError::InvalidConfidence(other.to_string())),
        }
    }
}

/// One agent's probability estimate for one market.
///
/// `outcome` and `brier_score` are stamped together by the reconciler when
/// the market resolves; until then both are `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forecast {
    pub id: Option<i64>,
    pub agent_id: String,
    pub market_id: String,
    pub probability: f64,
    pub confidence: Confidence,
    pub reasoning: Option<String>,
    pub market_price_at_forecast: Option<f64>,
    pub outcome: Option<bool>,
    pub brier_score: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Forecast {
    pub fn is_scored(&self) -> bool {
        self.brier_score.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub agent_id: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

/// Incoming forecast submission, validated before it reaches storage.
#[derive(Debug, Clone, Deserialize)]
pub struct ForecastSubmission {
    pub agent_id: String,
    pub market_id: String,
    pub probability: f64,
    pub confidence: String,
    pub reasoning: Option<String>,
}

impl ForecastSubmission {
    /// Reject malformed input up front. Out-of-range probabilities are an
    /// error, never clamped.
    pub fn validate(&self) -> Result<Confidence, EngineError> {
        if !self.probability.is_finite() || !(0.0..=1.0).contains(&self.probability) {
            return Err(EngineError::InvalidProbability(self.probability));
        }
        Confidence::parse(&self.confidence)
    }
}
