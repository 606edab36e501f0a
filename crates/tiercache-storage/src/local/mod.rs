//! In-process local tier

mod cache;
mod expiry_index;

pub use cache::{LocalCache, LocalCacheConfig};
