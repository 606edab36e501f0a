//! Connection pool configuration

use std::time::Duration;

/// Sizing, timeout and health-check settings for [`ConnectionPool`](super::ConnectionPool)
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Upper bound on connections checked out at once
    pub max_connections: usize,

    /// Idle connections kept warm
    pub min_connections: usize,

    /// How long `acquire` waits for a free slot
    pub connection_timeout: Duration,

    /// Connect attempts before giving up on a new connection
    pub retry_attempts: u32,

    /// Pause between connect attempts
    pub retry_delay: Duration,

    /// Minimum time between health sweeps of idle connections
    pub health_check_interval: Duration,

    /// Idle connections unused for longer than this are closed
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 2,
            connection_timeout: Duration::from_secs(5),
            retry_attempts: 3,
            retry_delay: Duration::from_millis(1000),
            health_check_interval: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(60),
        }
    }
}

impl PoolConfig {
    /// Set the connection bounds
    pub fn size(mut self, min: usize, max: usize) -> Self {
        self.min_connections = min;
        self.max_connections = max.max(1);
        self
    }

    /// Set the acquire timeout
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set connect retry behaviour
    pub fn retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.retry_attempts = attempts;
        self.retry_delay = delay;
        self
    }

    /// Set the idle timeout
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the health sweep interval
    pub fn health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval = interval;
        self
    }
}
