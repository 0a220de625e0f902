use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Yes,
    No,
}

/// Position-sizing profile. A profile is nothing but a parameter table fed
/// to the sizing function; it has no behavior of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyProfile {
    Balanced,
    Aggressive,
    Conservative,
    Arbitrage,
}

#[derive(Debug, Clone, Copy)]
pub struct SizingParams {
    /// Minimum consensus-vs-price edge worth acting on.
    pub min_edge: f64,
    /// Fraction of full Kelly to deploy.
    pub kelly_fraction: f64,
    /// Cap on position size as a fraction of bankroll.
    pub max_position_pct: f64,
    /// Don't act on probabilities outside this band.
    pub min_probability: f64,
    pub max_probability: f64,
}

impl StrategyProfile {
    pub fn params(&self) -> SizingParams {
        match self {
            StrategyProfile::Balanced => SizingParams {
                min_edge: 0.05,
                kelly_fraction: 0.5,
                max_position_pct: 0.10,
                min_probability: 0.05,
                max_probability: 0.95,
            },
            StrategyProfile::Aggressive => SizingParams {
                min_edge: 0.03,
                kelly_fraction: 0.75,
                max_position_pct: 0.15,
                min_probability: 0.05,
                max_probability: 0.95,
            },
            StrategyProfile::Conservative => SizingParams {
                min_edge: 0.10,
                kelly_fraction: 0.25,
                max_position_pct: 0.05,
                min_probability: 0.05,
                max_probability: 0.95,
            },
            StrategyProfile::Arbitrage => SizingParams {
                min_edge: 0.005,
                kelly_fraction: 1.0,
                max_position_pct: 0.50,
                min_probability: 0.0,
                max_probability: 1.0,
            },
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "balanced" => Some(StrategyProfile::Balanced),
            "aggressive" => Some(StrategyProfile::Aggressive),
            "conservative" => Some(StrategyProfile::Conservative),
            "arbitrage" => Some(StrategyProfile::Arbitrage),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyProfile::Balanced => "balanced",
            StrategyProfile::Aggressive => "aggressive",
            StrategyProfile::Conservative => "conservative",
            StrategyProfile::Arbitrage => "arbitrage",
        }
    }
}

/// A sized recommendation derived from a consensus probability and the
/// current market price.
#[derive(Debug, Clone)]
pub struct SizedPosition {
    pub side: Side,
    pub size: f64,
    pub entry_price: f64,
    pub edge: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_round_trip() {
        for profile in [
            StrategyProfile::Balanced,
            StrategyProfile::Aggressive,
            StrategyProfile::Conservative,
            StrategyProfile::Arbitrage,
        ] {
            assert_eq!(StrategyProfile::from_name(profile.as_str()), Some(profile));
        }
        assert_eq!(StrategyProfile::from_name("yolo"), None);
    }

    #[test]
    fn test_profiles_order_by_risk() {
        let conservative = StrategyProfile::Conservative.params();
        let balanced = StrategyProfile::Balanced.params();
        let aggressive = StrategyProfile::Aggressive.params();

        assert!(conservative.kelly_fraction < balanced.kelly_fraction);
        assert!(balanced.kelly_fraction < aggressive.kelly_fraction);
        assert!(conservative.min_edge > balanced.min_edge);
        assert!(balanced.min_edge > aggressive.min_edge);
    }
}
