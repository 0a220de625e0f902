use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::collections::HashMap;

use crate::data::types::{Agent, Forecast, ForecastSubmission, Market};
use crate::error::EngineError;

/// SQLite-backed store for agents, markets, and forecasts.
///
/// The engine treats this as a plain CRUD collaborator: filtered reads plus
/// atomic per-record updates. Score writes always carry a
/// `brier_score IS NULL` guard so re-running a scoring pass is a no-op.
pub struct ForecastStore {
    conn: Connection,
}

impl ForecastStore {
    pub fn new(db_path: &str) -> Result<Self, EngineError> {
        Self::from_connection(Connection::open(db_path)?)
    }

    pub fn open_in_memory() -> Result<Self, EngineError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, EngineError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS agents (
                agent_id TEXT PRIMARY KEY,
                display_name TEXT NOT NULL,
                created_at TIMESTAMP NOT NULL
            );

            CREATE TABLE IF NOT EXISTS markets (
                id TEXT PRIMARY KEY,
                question TEXT NOT NULL,
                category TEXT NOT NULL DEFAULT 'other',
                yes_price REAL NOT NULL DEFAULT 0.5,
                no_price REAL NOT NULL DEFAULT 0.5,
                volume_24h REAL NOT NULL DEFAULT 0.0,
                total_volume REAL NOT NULL DEFAULT 0.0,
                resolution_date TIMESTAMP,
                resolved INTEGER NOT NULL DEFAULT 0,
                resolution_outcome INTEGER,
                last_updated TIMESTAMP NOT NULL
            );

            CREATE TABLE IF NOT EXISTS forecasts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                agent_id TEXT NOT NULL,
                market_id TEXT NOT NULL,
                probability REAL NOT NULL,
                confidence TEXT NOT NULL,
                reasoning TEXT,
                market_price_at_forecast REAL,
                outcome INTEGER,
                brier_score REAL,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL,
                UNIQUE(agent_id, market_id)
            );

            CREATE INDEX IF NOT EXISTS idx_forecasts_market_id ON forecasts(market_id);
            CREATE INDEX IF NOT EXISTS idx_forecasts_agent_id ON forecasts(agent_id);
            CREATE INDEX IF NOT EXISTS idx_markets_resolved ON markets(resolved);
            "#,
        )?;

        Ok(Self { conn })
    }

    // -------------------------------------------------------------------
    // Agents
    // -------------------------------------------------------------------

    pub fn register_agent(&self, agent_id: &str, display_name: &str) -> Result<(), EngineError> {
        self.conn.execute(
            "INSERT OR IGNORE INTO agents (agent_id, display_name, created_at)
             VALUES (?1, ?2, ?3)",
            params![agent_id, display_name, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// All agents in registration order. Benchmark ranking iterates this
    /// order, which makes Brier ties deterministic.
    pub fn agents(&self) -> Result<Vec<Agent>, EngineError> {
        let mut stmt = self.conn.prepare(
            "SELECT agent_id, display_name, created_at FROM agents ORDER BY rowid",
        )?;

        let agents = stmt.query_map([], |row| {
            Ok(Agent {
                agent_id: row.get(0)?,
                display_name: row.get(1)?,
                created_at: parse_ts(row.get(2)?, 2)?,
            })
        })?;

        Ok(agents.collect::<Result<Vec<_>, _>>()?)
    }

    // -------------------------------------------------------------------
    // Forecasts
    // -------------------------------------------------------------------

    /// Submit or update a forecast.
    ///
    /// One live forecast per (agent, market): a resubmission overwrites
    /// probability, confidence, and reasoning in place. The original
    /// `created_at` and `market_price_at_forecast` are preserved so the
    /// beat-market comparison keeps the price from when the agent first
    /// took a view. Scored forecasts are immutable.
    pub fn submit_forecast(
        &self,
        submission: &ForecastSubmission,
        market_price: Option<f64>,
    ) -> Result<Forecast, EngineError> {
        let confidence = submission.validate()?;
        let now = Utc::now().to_rfc3339();

        if let Some(existing) = self.forecast_for(&submission.agent_id, &submission.market_id)? {
            if existing.is_scored() {
                return Err(EngineError::ForecastAlreadyScored {
                    agent_id: submission.agent_id.clone(),
                    market_id: submission.market_id.clone(),
                });
            }

            self.conn.execute(
                "UPDATE forecasts
                 SET probability = ?1, confidence = ?2, reasoning = ?3, updated_at = ?4
                 WHERE agent_id = ?5 AND market_id = ?6 AND brier_score IS NULL",
                params![
                    submission.probability,
                    confidence.as_str(),
                    submission.reasoning,
                    now,
                    submission.agent_id,
                    submission.market_id,
                ],
            )?;
        } else {
            // Registration is an external concern; the row here only feeds
            // display names and ranking order.
            self.register_agent(&submission.agent_id, &submission.agent_id)?;

            self.conn.execute(
                "INSERT INTO forecasts
                 (agent_id, market_id, probability, confidence, reasoning,
                  market_price_at_forecast, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                params![
                    submission.agent_id,
                    submission.market_id,
                    submission.probability,
                    confidence.as_str(),
                    submission.reasoning,
                    market_price,
                    now,
                ],
            )?;
        }

        self.forecast_for(&submission.agent_id, &submission.market_id)?
            .ok_or_else(|| EngineError::NoForecasts(submission.market_id.clone()))
    }

    pub fn forecast_for(
        &self,
        agent_id: &str,
        market_id: &str,
    ) -> Result<Option<Forecast>, EngineError> {
        let forecasts = self.query_forecasts(
            "WHERE agent_id = ?1 AND market_id = ?2",
            params![agent_id, market_id],
        )?;
        Ok(forecasts.into_iter().next())
    }

    pub fn forecasts_for_market(&self, market_id: &str) -> Result<Vec<Forecast>, EngineError> {
        self.query_forecasts("WHERE market_id = ?1 ORDER BY created_at", params![market_id])
    }

    pub fn unscored_forecasts_for_market(
        &self,
        market_id: &str,
    ) -> Result<Vec<Forecast>, EngineError> {
        self.query_forecasts(
            "WHERE market_id = ?1 AND brier_score IS NULL ORDER BY created_at",
            params![market_id],
        )
    }

    pub fn scored_forecasts_for_agent(&self, agent_id: &str) -> Result<Vec<Forecast>, EngineError> {
        self.query_forecasts(
            "WHERE agent_id = ?1 AND brier_score IS NOT NULL ORDER BY created_at",
            params![agent_id],
        )
    }

    /// Apply computed scores in one transaction. Each write is guarded by
    /// the unset-score filter, so rows scored by a concurrent pass are
    /// skipped and the returned count reflects rows actually stamped.
    pub fn apply_scores(
        &self,
        outcome: bool,
        scores: &[(i64, f64)],
    ) -> Result<usize, EngineError> {
        let tx = self.conn.unchecked_transaction()?;
        let now = Utc::now().to_rfc3339();
        let mut stamped = 0;

        for (forecast_id, brier) in scores {
            stamped += tx.execute(
                "UPDATE forecasts
                 SET outcome = ?1, brier_score = ?2, updated_at = ?3
                 WHERE id = ?4 AND brier_score IS NULL",
                params![outcome, brier, now, forecast_id],
            )?;
        }

        tx.commit()?;
        Ok(stamped)
    }

    /// Average Brier per agent over scored history, used as the reputation
    /// input to weighted consensus.
    pub fn average_brier_by_agent(&self) -> Result<HashMap<String, f64>, EngineError> {
        let mut stmt = self.conn.prepare(
            "SELECT agent_id, AVG(brier_score) FROM forecasts
             WHERE brier_score IS NOT NULL
             GROUP BY agent_id",
        )?;

        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)))?;
        Ok(rows.collect::<Result<HashMap<_, _>, _>>()?)
    }

    fn query_forecasts(
        &self,
        clause: &str,
        query_params: impl rusqlite::Params,
    ) -> Result<Vec<Forecast>, EngineError> {
        let sql = format!(
            "SELECT id, agent_id, market_id, probability, confidence, reasoning,
                    market_price_at_forecast, outcome, brier_score, created_at, updated_at
             FROM forecasts {}",
            clause
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let forecasts = stmt
            .query_map(query_params, forecast_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        // Outcome and score are written together; seeing one without the
        // other means storage corruption and must not be papered over.
        for forecast in &forecasts {
            if forecast.outcome.is_some() != forecast.brier_score.is_some() {
                return Err(EngineError::InconsistentForecast {
                    forecast_id: forecast.id.unwrap_or_default(),
                });
            }
        }

        Ok(forecasts)
    }

    // -------------------------------------------------------------------
    // Markets
    // -------------------------------------------------------------------

    /// Insert or refresh a market snapshot. Resolution fields are never
    /// touched here; that transition goes through `mark_market_resolved`.
    pub fn upsert_market(&self, market: &Market) -> Result<(), EngineError> {
        self.conn.execute(
            "INSERT INTO markets
             (id, question, category, yes_price, no_price, volume_24h, total_volume,
              resolution_date, resolved, resolution_outcome, last_updated)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, NULL, ?9)
             ON CONFLICT(id) DO UPDATE SET
                question = excluded.question,
                category = excluded.category,
                yes_price = excluded.yes_price,
                no_price = excluded.no_price,
                volume_24h = excluded.volume_24h,
                total_volume = excluded.total_volume,
                last_updated = excluded.last_updated",
            params![
                market.id,
                market.question,
                market.category,
                market.yes_price,
                market.no_price,
                market.volume_24h,
                market.total_volume,
                market.resolution_date.map(|dt| dt.to_rfc3339()),
                market.last_updated.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Transition a market to resolved. Returns true if this call performed
    /// the transition; once resolved, an outcome never changes and a
    /// conflicting later report is ignored.
    pub fn mark_market_resolved(
        &self,
        market_id: &str,
        outcome: bool,
        resolution_date: Option<DateTime<Utc>>,
    ) -> Result<bool, EngineError> {
        if self.market(market_id)?.is_none() {
            // Resolution can arrive before the market-sync worker has ever
            // seen this market; create a minimal row so scoring can proceed.
            self.conn.execute(
                "INSERT INTO markets (id, question, last_updated) VALUES (?1, '', ?2)",
                params![market_id, Utc::now().to_rfc3339()],
            )?;
        }

        let changed = self.conn.execute(
            "UPDATE markets
             SET resolved = 1, resolution_outcome = ?1, resolution_date = ?2, last_updated = ?3
             WHERE id = ?4 AND resolved = 0",
            params![
                outcome,
                resolution_date.map(|dt| dt.to_rfc3339()),
                Utc::now().to_rfc3339(),
                market_id,
            ],
        )?;

        Ok(changed > 0)
    }

    pub fn market(&self, market_id: &str) -> Result<Option<Market>, EngineError> {
        let mut stmt = self.conn.prepare(&format!("{} WHERE id = ?1", MARKET_SELECT))?;
        let mut rows = stmt
            .query_map(params![market_id], market_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows.pop())
    }

    pub fn resolved_markets(&self) -> Result<Vec<Market>, EngineError> {
        let mut stmt = self.conn.prepare(&format!(
            "{} WHERE resolved = 1 AND resolution_outcome IS NOT NULL ORDER BY id",
            MARKET_SELECT
        ))?;
        let markets = stmt
            .query_map([], market_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(markets)
    }
}

const MARKET_SELECT: &str =
    "SELECT id, question, category, yes_price, no_price, volume_24h, total_volume,
            resolution_date, resolved, resolution_outcome, last_updated
     FROM markets";

fn forecast_from_row(row: &Row<'_>) -> rusqlite::Result<Forecast> {
    let confidence_raw: String = row.get(4)?;
    let confidence = crate::data::types::Confidence::parse(&confidence_raw).map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("unknown confidence '{}'", confidence_raw).into(),
        )
    })?;

    Ok(Forecast {
        id: Some(row.get(0)?),
        agent_id: row.get(1)?,
        market_id: row.get(2)?,
        probability: row.get(3)?,
        confidence,
        reasoning: row.get(5)?,
        market_price_at_forecast: row.get(6)?,
        outcome: row.get(7)?,
        brier_score: row.get(8)?,
        created_at: parse_ts(row.get(9)?, 9)?,
        updated_at: parse_ts(row.get(10)?, 10)?,
    })
}

fn market_from_row(row: &Row<'_>) -> rusqlite::Result<Market> {
    let resolution_date: Option<String> = row.get(7)?;
    let resolution_date = match resolution_date {
        Some(raw) => Some(parse_ts(raw, 7)?),
        None => None,
    };

    Ok(Market {
        id: row.get(0)?,
        question: row.get(1)?,
        category: row.get(2)?,
        yes_price: row.get(3)?,
        no_price: row.get(4)?,
        volume_24h: row.get(5)?,
        total_volume: row.get(6)?,
        resolution_date,
        resolved: row.get(8)?,
        resolution_outcome: row.get(9)?,
        last_updated: parse_ts(row.get(10)?, 10)?,
    })
}

fn parse_ts(raw: String, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                column,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission(agent: &str, market: &str, probability: f64) -> ForecastSubmission {
        ForecastSubmission {
            agent_id: agent.to_string(),
            market_id: market.to_string(),
            probability,
            confidence: "medium".to_string(),
            reasoning: Some("test reasoning".to_string()),
        }
    }

    #[test]
    fn test_submit_creates_and_autoregisters() {
        let store = ForecastStore::open_in_memory().unwrap();

        let forecast = store
            .submit_forecast(&submission("alice", "mkt-1", 0.7), Some(0.6))
            .unwrap();

        assert_eq!(forecast.agent_id, "alice");
        assert!((forecast.probability - 0.7).abs() < 1e-9);
        assert_eq!(forecast.market_price_at_forecast, Some(0.6));
        assert!(!forecast.is_scored());

        let agents = store.agents().unwrap();
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].agent_id, "alice");
    }

    #[test]
    fn test_resubmission_updates_in_place() {
        let store = ForecastStore::open_in_memory().unwrap();

        let first = store
            .submit_forecast(&submission("alice", "mkt-1", 0.3), Some(0.55))
            .unwrap();
        let second = store
            .submit_forecast(&submission("alice", "mkt-1", 0.8), Some(0.99))
            .unwrap();

        // Still a single live record
        let all = store.forecasts_for_market("mkt-1").unwrap();
        assert_eq!(all.len(), 1);
        assert!((all[0].probability - 0.8).abs() < 1e-9);

        // First-submission metadata survives the overwrite
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.market_price_at_forecast, Some(0.55));
    }

    #[test]
    fn test_scored_forecast_is_immutable() {
        let store = ForecastStore::open_in_memory().unwrap();

        let forecast = store
            .submit_forecast(&submission("alice", "mkt-1", 0.7), None)
            .unwrap();
        let stamped = store
            .apply_scores(true, &[(forecast.id.unwrap(), 0.09)])
            .unwrap();
        assert_eq!(stamped, 1);

        let err = store
            .submit_forecast(&submission("alice", "mkt-1", 0.9), None)
            .unwrap_err();
        assert!(matches!(err, EngineError::ForecastAlreadyScored { .. }));

        // And the stored values are unchanged
        let stored = store.forecast_for("alice", "mkt-1").unwrap().unwrap();
        assert!((stored.probability - 0.7).abs() < 1e-9);
        assert_eq!(stored.outcome, Some(true));
    }

    #[test]
    fn test_apply_scores_skips_already_scored() {
        let store = ForecastStore::open_in_memory().unwrap();

        let forecast = store
            .submit_forecast(&submission("alice", "mkt-1", 0.7), None)
            .unwrap();
        let id = forecast.id.unwrap();

        assert_eq!(store.apply_scores(true, &[(id, 0.09)]).unwrap(), 1);
        // Second pass stamps nothing
        assert_eq!(store.apply_scores(true, &[(id, 0.25)]).unwrap(), 0);

        let stored = store.forecast_for("alice", "mkt-1").unwrap().unwrap();
        assert!((stored.brier_score.unwrap() - 0.09).abs() < 1e-9);
    }

    #[test]
    fn test_market_resolution_is_one_way() {
        let store = ForecastStore::open_in_memory().unwrap();

        assert!(store.mark_market_resolved("mkt-1", true, None).unwrap());
        // Conflicting second report is ignored
        assert!(!store.mark_market_resolved("mkt-1", false, None).unwrap());

        let market = store.market("mkt-1").unwrap().unwrap();
        assert!(market.resolved);
        assert_eq!(market.resolution_outcome, Some(true));
    }

    #[test]
    fn test_upsert_market_never_touches_resolution() {
        let store = ForecastStore::open_in_memory().unwrap();
        store.mark_market_resolved("mkt-1", true, None).unwrap();

        let snapshot = Market {
            id: "mkt-1".to_string(),
            question: "updated?".to_string(),
            category: "other".to_string(),
            yes_price: 0.9,
            no_price: 0.1,
            volume_24h: 10.0,
            total_volume: 100.0,
            resolution_date: None,
            resolved: false,
            resolution_outcome: None,
            last_updated: Utc::now(),
        };
        store.upsert_market(&snapshot).unwrap();

        let market = store.market("mkt-1").unwrap().unwrap();
        assert_eq!(market.question, "updated?");
        assert!(market.resolved);
        assert_eq!(market.resolution_outcome, Some(true));
    }

    #[test]
    fn test_inconsistent_row_fails_loudly() {
        let store = ForecastStore::open_in_memory().unwrap();
        store
            .submit_forecast(&submission("alice", "mkt-1", 0.7), None)
            .unwrap();

        // Simulate a storage-layer bug: outcome without a score
        store
            .conn
            .execute("UPDATE forecasts SET outcome = 1", [])
            .unwrap();

        let err = store.forecasts_for_market("mkt-1").unwrap_err();
        assert!(matches!(err, EngineError::InconsistentForecast { .. }));
    }

    #[test]
    fn test_average_brier_by_agent() {
        let store = ForecastStore::open_in_memory().unwrap();

        let a = store
            .submit_forecast(&submission("alice", "mkt-1", 0.7), None)
            .unwrap();
        let b = store
            .submit_forecast(&submission("alice", "mkt-2", 0.9), None)
            .unwrap();
        store
            .submit_forecast(&submission("bob", "mkt-1", 0.4), None)
            .unwrap();

        store.apply_scores(true, &[(a.id.unwrap(), 0.09)]).unwrap();
        store.apply_scores(true, &[(b.id.unwrap(), 0.01)]).unwrap();

        let averages = store.average_brier_by_agent().unwrap();
        assert!((averages["alice"] - 0.05).abs() < 1e-9);
        assert!(!averages.contains_key("bob"));
    }
}
