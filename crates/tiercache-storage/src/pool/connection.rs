//! Bounded connection pool with health checks

use bb8::ManageConnection;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tiercache_core::{CacheError, Result};

use super::config::PoolConfig;

/// Pause between checkout attempts while the pool is saturated
const SATURATED_BACKOFF: Duration = Duration::from_millis(10);

/// Lifecycle state of the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    /// Opening the initial connections
    Initializing,
    /// Ready to serve checkouts
    Idle,
}

/// Snapshot returned by [`ConnectionPool::status`]
#[derive(Debug, Clone)]
pub struct PoolStatus {
    pub state: PoolState,
    pub idle: usize,
    pub checked_out: usize,
    pub total: usize,
    pub config: PoolConfig,
}

struct IdleConn<C> {
    id: u64,
    conn: C,
    created_at: Instant,
    last_used: Instant,
}

struct Shared<C> {
    state: PoolState,
    idle: Vec<IdleConn<C>>,
    checked_out: HashSet<u64>,
    /// Connections out of both sets while their health is checked
    validating: usize,
    next_id: u64,
    last_sweep: Instant,
}

impl<C> Shared<C> {
    fn reserve(&mut self) -> u64 {
        self.next_id += 1;
        self.checked_out.insert(self.next_id);
        self.next_id
    }

    fn total(&self) -> usize {
        self.idle.len() + self.checked_out.len() + self.validating
    }

    /// Put a validated connection back, unless the pool filled up meanwhile
    fn restore(&mut self, conn: IdleConn<C>, max: usize) -> bool {
        self.validating = self.validating.saturating_sub(1);
        if self.total() >= max {
            return false;
        }
        self.idle.push(conn);
        true
    }
}

enum Checkout<C> {
    Idle(IdleConn<C>),
    Create(u64),
    Saturated,
}

/// Pool of connections produced by a [`bb8::ManageConnection`]
///
/// At most `max_connections` are checked out at once. Each checkout is a
/// [`PooledConnection`] guard; hand it back with [`release`](Self::release)
/// so it can be validated and reused. A guard that is simply dropped frees its
/// slot and closes the connection.
///
/// Cloning creates a new handle to the SAME pool.
pub struct ConnectionPool<M: ManageConnection> {
    manager: Arc<M>,
    config: PoolConfig,
    shared: Arc<Mutex<Shared<M::Connection>>>,
}

impl<M: ManageConnection> Clone for ConnectionPool<M> {
    fn clone(&self) -> Self {
        Self {
            manager: Arc::clone(&self.manager),
            config: self.config.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<M: ManageConnection> fmt::Debug for ConnectionPool<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("status", &self.status())
            .finish()
    }
}

impl<M: ManageConnection> ConnectionPool<M> {
    /// Create a pool and open `min_connections` connections
    pub async fn new(manager: M, config: PoolConfig) -> Result<Self> {
        let pool = Self {
            manager: Arc::new(manager),
            shared: Arc::new(Mutex::new(Shared {
                state: PoolState::Initializing,
                idle: Vec::with_capacity(config.max_connections),
                checked_out: HashSet::new(),
                validating: 0,
                next_id: 0,
                last_sweep: Instant::now(),
            })),
            config,
        };

        for _ in 0..pool.config.min_connections.min(pool.config.max_connections) {
            let conn = pool.connect().await?;
            pool.push_idle(conn, Instant::now());
        }

        pool.shared.lock().state = PoolState::Idle;
        tracing::debug!(
            target: "tiercache",
            min = pool.config.min_connections,
            max = pool.config.max_connections,
            "connection pool ready"
        );
        Ok(pool)
    }

    /// Pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Check out a connection
    ///
    /// Waits up to `connection_timeout` while the pool is saturated, then
    /// fails with [`CacheError::PoolExhausted`]. A failure to open a new
    /// connection is reported as [`CacheError::Connection`].
    pub async fn acquire(&self) -> Result<PooledConnection<M>> {
        self.maintain().await;

        let deadline = Instant::now() + self.config.connection_timeout;
        loop {
            let next = {
                let mut shared = self.shared.lock();
                if shared.checked_out.len() >= self.config.max_connections {
                    Checkout::Saturated
                } else if let Some(idle) = shared.idle.pop() {
                    shared.checked_out.insert(idle.id);
                    Checkout::Idle(idle)
                } else if shared.total() >= self.config.max_connections {
                    // Remaining capacity is under a health check
                    Checkout::Saturated
                } else {
                    Checkout::Create(shared.reserve())
                }
            };

            match next {
                Checkout::Idle(idle) => {
                    let mut guard = self.guard(idle.id, idle.created_at);
                    let mut conn = idle.conn;
                    if self.validate(&mut conn).await {
                        guard.conn = Some(conn);
                        return Ok(guard);
                    }
                    tracing::debug!(target: "tiercache", id = idle.id, "dropping dead idle connection");
                    // Dropping the guard frees the slot; try again
                }
                Checkout::Create(id) => {
                    let mut guard = self.guard(id, Instant::now());
                    guard.conn = Some(self.connect().await?);
                    return Ok(guard);
                }
                Checkout::Saturated => {
                    if Instant::now() >= deadline {
                        tracing::warn!(
                            target: "tiercache",
                            timeout = ?self.config.connection_timeout,
                            max = self.config.max_connections,
                            "connection pool exhausted"
                        );
                        return Err(CacheError::PoolExhausted(self.config.connection_timeout));
                    }
                    tokio::time::sleep(SATURATED_BACKOFF).await;
                }
            }
        }
    }

    /// Return a connection to the pool
    ///
    /// The connection is kept for reuse only if it still passes a liveness
    /// validation and the pool has not been closed since it was checked out.
    pub async fn release(&self, mut pooled: PooledConnection<M>) {
        pooled.released = true;
        let Some(mut conn) = pooled.conn.take() else {
            self.shared.lock().checked_out.remove(&pooled.id);
            return;
        };
        {
            let mut shared = self.shared.lock();
            if !shared.checked_out.remove(&pooled.id) {
                return;
            }
            shared.validating += 1;
        }

        let healthy = self.validate(&mut conn).await;
        let mut shared = self.shared.lock();
        if !healthy {
            shared.validating = shared.validating.saturating_sub(1);
            tracing::debug!(target: "tiercache", id = pooled.id, "discarding unhealthy connection");
            return;
        }
        let idle = IdleConn {
            id: pooled.id,
            conn,
            created_at: pooled.created_at,
            last_used: Instant::now(),
        };
        if !shared.restore(idle, self.config.max_connections) {
            tracing::debug!(target: "tiercache", id = pooled.id, "pool full, closing released connection");
        }
    }

    /// Current pool status
    pub fn status(&self) -> PoolStatus {
        let shared = self.shared.lock();
        PoolStatus {
            state: shared.state,
            idle: shared.idle.len(),
            checked_out: shared.checked_out.len(),
            total: shared.total(),
            config: self.config.clone(),
        }
    }

    /// Close every idle connection and forget outstanding checkouts
    ///
    /// Connections released after this call are discarded.
    pub fn close_all(&self) {
        let mut shared = self.shared.lock();
        let closed = shared.idle.len();
        shared.idle.clear();
        shared.checked_out.clear();
        tracing::debug!(target: "tiercache", closed, "connection pool closed");
    }

    fn guard(&self, id: u64, created_at: Instant) -> PooledConnection<M> {
        PooledConnection {
            id,
            conn: None,
            created_at,
            released: false,
            shared: Arc::clone(&self.shared),
        }
    }

    fn push_idle(&self, conn: M::Connection, now: Instant) {
        let mut shared = self.shared.lock();
        shared.next_id += 1;
        let id = shared.next_id;
        shared.idle.push(IdleConn {
            id,
            conn,
            created_at: now,
            last_used: now,
        });
    }

    /// Reap expired idle connections, run the periodic health sweep and top
    /// the idle set back up to `min_connections`
    async fn maintain(&self) {
        let now = Instant::now();
        let to_validate = {
            let mut shared = self.shared.lock();
            let idle_timeout = self.config.idle_timeout;
            shared
                .idle
                .retain(|c| now.duration_since(c.last_used) <= idle_timeout);

            if now.duration_since(shared.last_sweep) >= self.config.health_check_interval {
                shared.last_sweep = now;
                let taken = std::mem::take(&mut shared.idle);
                shared.validating += taken.len();
                taken
            } else {
                Vec::new()
            }
        };

        if !to_validate.is_empty() {
            for mut idle in to_validate {
                let healthy = self.validate(&mut idle.conn).await;
                let mut shared = self.shared.lock();
                if !healthy {
                    shared.validating = shared.validating.saturating_sub(1);
                    tracing::debug!(target: "tiercache", id = idle.id, "health check failed");
                } else if !shared.restore(idle, self.config.max_connections) {
                    tracing::debug!(target: "tiercache", "pool full, closing swept connection");
                }
            }
        }

        let missing = {
            let shared = self.shared.lock();
            let room = self.config.max_connections.saturating_sub(shared.total());
            self.config
                .min_connections
                .saturating_sub(shared.idle.len())
                .min(room)
        };
        for _ in 0..missing {
            match self.connect().await {
                Ok(conn) => self.push_idle(conn, Instant::now()),
                Err(e) => {
                    tracing::warn!(target: "tiercache", error = %e, "failed to top up idle connections");
                    break;
                }
            }
        }
    }

    async fn connect(&self) -> Result<M::Connection> {
        let attempts = self.config.retry_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.manager.connect().await {
                Ok(conn) => return Ok(conn),
                Err(e) => {
                    last_error = format!("{e:?}");
                    tracing::warn!(
                        target: "tiercache",
                        attempt,
                        attempts,
                        error = %last_error,
                        "connect attempt failed"
                    );
                    if attempt < attempts {
                        tokio::time::sleep(self.config.retry_delay).await;
                    }
                }
            }
        }

        Err(CacheError::Connection(last_error))
    }

    async fn validate(&self, conn: &mut M::Connection) -> bool {
        !self.manager.has_broken(conn) && self.manager.is_valid(conn).await.is_ok()
    }
}

/// A connection checked out of a [`ConnectionPool`]
pub struct PooledConnection<M: ManageConnection> {
    id: u64,
    conn: Option<M::Connection>,
    created_at: Instant,
    released: bool,
    shared: Arc<Mutex<Shared<M::Connection>>>,
}

impl<M: ManageConnection> PooledConnection<M> {
    /// Pool-assigned connection id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// When the underlying connection was opened
    pub fn created_at(&self) -> Instant {
        self.created_at
    }
}

impl<M: ManageConnection> Deref for PooledConnection<M> {
    type Target = M::Connection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect("pooled connection already returned")
    }
}

impl<M: ManageConnection> DerefMut for PooledConnection<M> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("pooled connection already returned")
    }
}

impl<M: ManageConnection> fmt::Debug for PooledConnection<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("released", &self.released)
            .finish()
    }
}

impl<M: ManageConnection> Drop for PooledConnection<M> {
    fn drop(&mut self) {
        if !self.released {
            self.shared.lock().checked_out.remove(&self.id);
        }
    }
}
