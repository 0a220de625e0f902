use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Brier score for a single forecast: `(probability - outcome)^2`.
///
/// Range 0 (perfect) to 1 (maximally wrong); 0.25 is the expected score of
/// a constant-0.5 forecaster. Out-of-range probabilities are a caller
/// contract violation and come back as an error, never clamped.
pub fn brier_score(probability: f64, outcome: bool) -> Result<f64, EngineError> {
    if !probability.is_finite() || !(0.0..=1.0).contains(&probability) {
        return Err(EngineError::InvalidProbability(probability));
    }

    let outcome_value = if outcome { 1.0 } else { 0.0 };
    Ok((probability - outcome_value).powi(2))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationBucket {
    pub bucket_min: f64,
    pub bucket_max: f64,
    pub count: usize,
    pub mean_forecast: f64,
    pub actual_resolution_rate: f64,
    pub calibration_error: f64,
}

/// Calibration error across fixed-width probability buckets.
///
/// Perfect calibration means forecasts at 70% resolve YES 70% of the time.
/// Probability 1.0 lands in the last bucket (the grid is half-open except
/// at the top edge). Returns the count-weighted mean error over non-empty
/// buckets, `None` when there are no forecasts at all, plus the non-empty
/// buckets in increasing range order.
pub fn calibration(
    forecasts: &[(f64, bool)],
    bucket_count: usize,
) -> (Option<f64>, Vec<CalibrationBucket>) {
    let n = bucket_count.max(1);
    let mut probabilities: Vec<Vec<f64>> = vec![Vec::new(); n];
    let mut outcomes: Vec<Vec<bool>> = vec![Vec::new(); n];

    for &(probability, outcome) in forecasts {
        let idx = ((probability * n as f64) as usize).min(n - 1);
        probabilities[idx].push(probability);
        outcomes[idx].push(outcome);
    }

    let mut buckets = Vec::new();
    let mut total_error = 0.0;
    let mut total_count = 0usize;

    for idx in 0..n {
        if probabilities[idx].is_empty() {
            continue;
        }

        let count = probabilities[idx].len();
        let mean_forecast = probabilities[idx].iter().sum::<f64>() / count as f64;
        let yes_count = outcomes[idx].iter().filter(|&&o| o).count();
        let actual_rate = yes_count as f64 / count as f64;
        let calibration_error = (mean_forecast - actual_rate).abs();

        buckets.push(CalibrationBucket {
            bucket_min: idx as f64 / n as f64,
            bucket_max: (idx + 1) as f64 / n as f64,
            count,
            mean_forecast,
            actual_resolution_rate: actual_rate,
            calibration_error,
        });

        total_error += calibration_error * count as f64;
        total_count += count;
    }

    let mean_error = if total_count > 0 {
        Some(total_error / total_count as f64)
    } else {
        None
    };

    (mean_error, buckets)
}
