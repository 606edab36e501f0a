//! In-process remote store
//!
//! Stands in for Redis in tests, benchmarks and single-node deployments.

mod pattern;
mod store;

pub use pattern::glob_match;
pub use store::MemoryStore;
