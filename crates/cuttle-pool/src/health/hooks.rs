//! Caller-supplied ping and normalize behavior

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cuttle_core::{Connection, Result};

use super::ping::ping_database;

/// Liveness probe and state reset applied by a pool to its connections
///
/// Both methods have defaults: `ping` reports every connection alive and
/// `normalize` does nothing. Hooks are fixed when the pool is built.
#[async_trait]
pub trait ConnectionHooks: Send + Sync + 'static {
    /// Check whether the connection is still usable
    async fn ping(&self, _conn: &dyn Connection) -> bool {
        true
    }

    /// Reset connection-level state before the connection is handed out
    async fn normalize(&self, _conn: &dyn Connection) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl<T: ConnectionHooks> ConnectionHooks for Arc<T> {
    async fn ping(&self, conn: &dyn Connection) -> bool {
        (**self).ping(conn).await
    }

    async fn normalize(&self, conn: &dyn Connection) -> Result<()> {
        (**self).normalize(conn).await
    }
}

/// Hooks that trust every connection and leave its state alone
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHooks;

impl ConnectionHooks for DefaultHooks {}

/// Hooks that ping with a lightweight query and optionally reset state with a statement
#[derive(Debug, Clone)]
pub struct QueryHooks {
    ping_timeout: Duration,
    reset_statement: Option<String>,
}

impl QueryHooks {
    /// Create query hooks with a 5 second ping timeout and no reset statement
    pub fn new() -> Self {
        Self {
            ping_timeout: Duration::from_secs(5),
            reset_statement: None,
        }
    }

    /// Set how long a ping may take before the connection counts as dead
    pub fn with_ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = timeout;
        self
    }

    /// Statement executed on every checkout, e.g. `SET autocommit = 1`
    pub fn with_reset_statement(mut self, sql: impl Into<String>) -> Self {
        self.reset_statement = Some(sql.into());
        self
    }

    /// Get the ping timeout
    pub fn ping_timeout(&self) -> Duration {
        self.ping_timeout
    }

    /// Get the reset statement, if any
    pub fn reset_statement(&self) -> Option<&str> {
        self.reset_statement.as_deref()
    }
}

impl Default for QueryHooks {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConnectionHooks for QueryHooks {
    async fn ping(&self, conn: &dyn Connection) -> bool {
        match tokio::time::timeout(self.ping_timeout, ping_database(conn)).await {
            Ok(Ok(latency)) => {
                tracing::trace!(?latency, "ping succeeded");
                true
            }
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "ping failed");
                false
            }
            Err(_) => {
                tracing::debug!(timeout = ?self.ping_timeout, "ping timed out");
                false
            }
        }
    }

    async fn normalize(&self, conn: &dyn Connection) -> Result<()> {
        if let Some(sql) = &self.reset_statement {
            conn.execute(sql, &[]).await?;
        }
        Ok(())
    }
}
