use crate::strategies::types::{Side, SizedPosition, SizingParams, StrategyProfile};

/// Calculate position size using the Kelly Criterion.
/// Formula: f* = (bp - q) / b
/// where b = odds, p = win probability, q = lose probability.
pub fn kelly_position(
    capital: f64,
    forecast_prob: f64,
    market_price: f64,
    params: &SizingParams,
) -> f64 {
    // Determine which side we're betting
    let (win_prob, bet_price) = if forecast_prob > market_price {
        (forecast_prob, market_price) // Bet YES
    } else {
        (1.0 - forecast_prob, 1.0 - market_price) // Bet NO
    };

    if bet_price <= 0.0 || bet_price >= 1.0 {
        return 0.0; // Nothing sensible to buy at the boundary
    }

    // Odds: (1 - price) / price
    let odds = (1.0 - bet_price) / bet_price;

    let lose_prob = 1.0 - win_prob;
    let kelly_fraction = (odds * win_prob - lose_prob) / odds;

    let fractional_kelly = kelly_fraction * params.kelly_fraction;

    let position = capital * fractional_kelly.max(0.0); // No negative positions

    // Apply maximum position constraint
    let max_position = capital * params.max_position_pct;

    position.min(max_position)
}

/// Turn a consensus probability and a market price into a sized position,
/// or nothing when the profile's gates (probability band, minimum edge)
/// say to stand aside.
pub fn size_position(
    capital: f64,
    consensus_prob: f64,
    market_price: f64,
    profile: StrategyProfile,
) -> Option<SizedPosition> {
    let params = profile.params();

    if consensus_prob < params.min_probability || consensus_prob > params.max_probability {
        return None;
    }

    let edge = (consensus_prob - market_price).abs();
    if edge < params.min_edge {
        return None;
    }

    let side = if consensus_prob > market_price {
        Side::Yes
    } else {
        Side::No
    };
    let entry_price = match side {
        Side::Yes => market_price,
        Side::No => 1.0 - market_price,
    };

    let size = kelly_position(capital, consensus_prob, market_price, &params);
    if size <= 0.0 {
        return None;
    }

    Some(SizedPosition {
        side,
        size,
        entry_price,
        edge,
    })
}
