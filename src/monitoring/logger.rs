use anyhow::Result;
use chrono::Utc;
use std::fs::OpenOptions;
use std::io::Write;

use crate::data::types::Forecast;

/// Append-only CSV audit log of scoring events, enabled via
/// `[monitoring]` config.
pub struct CsvLogger {
    log_path: String,
}

impl CsvLogger {
    pub fn new(log_path: String) -> Result<Self> {
        // Create CSV file with headers if it doesn't exist
        if !std::path::Path::new(&log_path).exists() {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .open(&log_path)?;

            writeln!(
                file,
                "timestamp,market_id,agent_id,probability,outcome,brier_score"
            )?;
        }

        Ok(Self { log_path })
    }

    /// Log a freshly scored forecast.
    pub fn log_score(&self, forecast: &Forecast) -> Result<()> {
        let mut file = OpenOptions::new().append(true).open(&self.log_path)?;

        let outcome_str = match forecast.outcome {
            Some(true) => "YES",
            Some(false) => "NO",
            None => "",
        };

        let brier_str = match forecast.brier_score {
            Some(brier) => format!("{:.6}", brier),
            None => String::new(),
        };

        writeln!(
            file,
            "{},{},{},{:.4},{},{}",
            forecast.updated_at.to_rfc3339(),
            forecast.market_id,
            forecast.agent_id,
            forecast.probability,
            outcome_str,
            brier_str
        )?;

        Ok(())
    }

    /// Log a worker event
    pub fn log_event(&self, event: &str) -> Result<()> {
        let mut file = OpenOptions::new().append(true).open(&self.log_path)?;

        writeln!(file, "{},EVENT,{},,,", Utc::now().to_rfc3339(), event)?;

        Ok(())
    }
}
