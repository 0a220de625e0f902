pub mod market_sync;
pub mod resolution_sync;
