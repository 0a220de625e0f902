use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use crate::data::types::Market;
use crate::error::EngineError;

/// Client for the Gamma market-data API.
///
/// The feed is the only upstream dependency of the engine. Individual
/// malformed entries are skipped; transport or body-level failures surface
/// as `EngineError::Upstream` so a worker tick can log and retry later
/// without touching local state.
pub struct GammaFeedClient {
    client: Client,
    base_url: String,
}

impl GammaFeedClient {
    pub fn new(base_url: String, timeout_secs: u64) -> Result<Self, EngineError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| EngineError::Upstream(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, base_url })
    }

    /// Fetch active (open) markets.
    pub async fn fetch_markets(&self, limit: usize) -> Result<Vec<Market>, EngineError> {
        self.fetch(&[
            ("active", "true".to_string()),
            ("closed", "false".to_string()),
            ("limit", limit.to_string()),
        ])
        .await
    }

    /// Fetch recently closed markets, including their resolution outcomes.
    pub async fn fetch_resolved_markets(&self, limit: usize) -> Result<Vec<Market>, EngineError> {
        self.fetch(&[
            ("closed", "true".to_string()),
            ("limit", limit.to_string()),
        ])
        .await
    }

    async fn fetch(&self, params: &[(&str, String)]) -> Result<Vec<Market>, EngineError> {
        let url = format!("{}/markets", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(params)
            .send()
            .await
            .map_err(|e| EngineError::Upstream(format!("request to {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(EngineError::Upstream(format!(
                "{} returned status {}",
                url,
                response.status()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| EngineError::Upstream(format!("malformed feed response: {}", e)))?;

        let entries = body
            .as_array()
            .ok_or_else(|| EngineError::Upstream("feed response is not an array".to_string()))?;

        Ok(entries.iter().filter_map(parse_market).collect())
    }
}

/// Convert one raw feed entry to our internal `Market`. Entries without a
/// usable id are dropped.
pub fn parse_market(raw: &Value) -> Option<Market> {
    let id = raw
        .get("condition_id")
        .or_else(|| raw.get("conditionId"))
        .or_else(|| raw.get("id"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())?
        .to_string();

    let question = raw
        .get("question")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let resolved = raw
        .get("resolved")
        .or_else(|| raw.get("closed"))
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let resolution_str = raw
        .get("resolutionOutcome")
        .or_else(|| raw.get("resolution"))
        .and_then(Value::as_str);

    let resolution_outcome = parse_resolution_outcome(resolved, resolution_str);

    let (yes_price, no_price) = parse_outcome_prices(raw.get("outcomePrices"));

    let resolution_date = raw
        .get("endDate")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc));

    let category = raw
        .get("groupItemTitle")
        .or_else(|| raw.get("category"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| infer_category(&question).to_string());

    Some(Market {
        id,
        question,
        category,
        yes_price,
        no_price,
        volume_24h: coerce_f64(raw.get("volume24hr")),
        total_volume: coerce_f64(raw.get("volume")),
        resolution_date,
        resolved,
        resolution_outcome,
        last_updated: Utc::now(),
    })
}

/// The feed reports resolutions as strings ("YES", "NO", sometimes "1"/"0").
/// Anything unrecognized is treated as not-yet-resolved.
pub fn parse_resolution_outcome(resolved: bool, raw: Option<&str>) -> Option<bool> {
    if !resolved {
        return None;
    }
    match raw.map(str::to_uppercase).as_deref() {
        Some("YES") | Some("TRUE") | Some("1") => Some(true),
        Some("NO") | Some("FALSE") | Some("0") => Some(false),
        _ => None,
    }
}

/// `outcomePrices` arrives either as an array or as a JSON-encoded string of
/// an array. Missing or malformed prices default to an uninformative 0.5/0.5.
pub fn parse_outcome_prices(raw: Option<&Value>) -> (f64, f64) {
    let parsed: Option<Value> = match raw {
        Some(Value::String(s)) => serde_json::from_str(s).ok(),
        Some(v) => Some(v.clone()),
        None => None,
    };

    let prices: Vec<f64> = parsed
        .as_ref()
        .and_then(Value::as_array)
        .map(|arr| arr.iter().map(|v| coerce_f64(Some(v))).collect())
        .unwrap_or_default();

    (
        prices.first().copied().unwrap_or(0.5),
        prices.get(1).copied().unwrap_or(0.5),
    )
}

/// Numeric feed fields arrive as numbers or numeric strings.
fn coerce_f64(raw: Option<&Value>) -> f64 {
    match raw {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Keyword-based category fallback for feed entries that omit one.
fn infer_category(question: &str) -> &'static str {
    let patterns: [(&str, &str); 4] = [
        (r"(?i)\b(bitcoin|btc|ethereum|eth|crypto|solana)\b", "crypto"),
        (r"(?i)\b(election|president|senate|congress|governor)\b", "politics"),
        (r"(?i)\b(nba|nfl|mlb|premier league|championship|cup)\b", "sports"),
        (r"(?i)\b(temperature|rain|snow|weather|hurricane)\b", "weather"),
    ];

    for (pattern, category) in patterns {
        if let Ok(re) = regex::Regex::new(pattern) {
            if re.is_match(question) {
                return category;
            }
        }
    }

    "other"
}
