pub mod cache;
pub mod feed;
pub mod types;
