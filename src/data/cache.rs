use dashmap::DashMap;
use std::time::{Duration, Instant};

use crate::data::types::Market;

/// In-memory cache of the latest market snapshots, refreshed by the
/// market-sync worker. The submission path reads it to stamp
/// `market_price_at_forecast` without a feed round-trip.
pub struct MarketCache {
    cache: DashMap<String, CachedMarket>,
    ttl: Duration,
}

struct CachedMarket {
    market: Market,
    fetched_at: Instant,
}

impl MarketCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: DashMap::new(),
            ttl,
        }
    }

    pub fn insert(&self, market: Market) {
        self.cache.insert(
            market.id.clone(),
            CachedMarket {
                market,
                fetched_at: Instant::now(),
            },
        );
    }

    /// Get a snapshot if not expired (evict on read).
    pub fn get(&self, market_id: &str) -> Option<Market> {
        self.cache.get(market_id).and_then(|entry| {
            if entry.fetched_at.elapsed() > self.ttl {
                drop(entry); // Drop the read lock
                self.cache.remove(market_id); // Evict stale entry
                None
            } else {
                Some(entry.market.clone())
            }
        })
    }

    /// Current YES price for a market, if a fresh snapshot exists.
    pub fn yes_price(&self, market_id: &str) -> Option<f64> {
        self.get(market_id).map(|m| m.yes_price)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
