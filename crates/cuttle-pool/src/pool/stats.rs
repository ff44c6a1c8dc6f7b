//! Pool statistics types

use serde::{Deserialize, Serialize};

/// Statistics about a connection pool's current state
///
/// Provides insight into pool utilization and health.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Number of idle connections available in the pool
    idle: usize,
    /// Number of connections currently checked out
    active: usize,
    /// Number of callers waiting for a connection
    waiting: usize,
    /// Connections opened over the pool's lifetime
    created: u64,
    /// Connections thrown away (closed, stale, or over capacity)
    discarded: u64,
    /// Acquire calls that gave up waiting
    timeouts: u64,
}

impl PoolStats {
    pub(crate) fn new(
        idle: usize,
        active: usize,
        waiting: usize,
        created: u64,
        discarded: u64,
        timeouts: u64,
    ) -> Self {
        Self {
            idle,
            active,
            waiting,
            created,
            discarded,
            timeouts,
        }
    }

    /// Get the total number of connections (idle + active)
    pub fn total(&self) -> usize {
        self.idle + self.active
    }

    /// Get the number of idle connections
    pub fn idle(&self) -> usize {
        self.idle
    }

    /// Get the number of active (checked out) connections
    pub fn active(&self) -> usize {
        self.active
    }

    /// Get the number of waiting callers
    pub fn waiting(&self) -> usize {
        self.waiting
    }

    /// Get the number of connections ever created
    pub fn created(&self) -> u64 {
        self.created
    }

    /// Get the number of connections discarded instead of pooled
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Get the number of acquire timeouts
    pub fn timeouts(&self) -> u64 {
        self.timeouts
    }

    /// Calculate pool utilization as a fraction (0.0 to 1.0)
    ///
    /// Returns 0.0 if total is 0 to avoid division by zero.
    pub fn utilization(&self) -> f64 {
        if self.total() == 0 {
            0.0
        } else {
            self.active as f64 / self.total() as f64
        }
    }

    /// Check if the pool is fully utilized (all connections in use)
    pub fn is_full(&self) -> bool {
        self.idle == 0 && self.total() > 0
    }
}
