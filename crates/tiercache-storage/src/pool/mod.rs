//! Connection pooling for remote stores

mod config;
mod connection;

pub use config::PoolConfig;
pub use connection::{ConnectionPool, PoolState, PoolStatus, PooledConnection};
