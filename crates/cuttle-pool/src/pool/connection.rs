//! Connection lease handed out by the pool

use std::sync::Weak;

use cuttle_core::{Connection, CuttleError, QueryResult, Result, StatementResult, Value};
use tokio::sync::OwnedSemaphorePermit;

use super::handle::ConnectionHandle;
use super::pool::PoolShared;

/// A connection checked out of a pool
///
/// Driver operations are forwarded to the underlying connection. Closing the
/// lease, explicitly or by dropping it, returns the connection to the pool
/// exactly once; afterwards every driver operation fails with
/// [`CuttleError::UseAfterClose`].
pub struct PoolConnection {
    handle: Option<ConnectionHandle>,
    permit: Option<OwnedSemaphorePermit>,
    pool: Weak<PoolShared>,
}

impl PoolConnection {
    pub(crate) fn new(
        handle: ConnectionHandle,
        permit: OwnedSemaphorePermit,
        pool: Weak<PoolShared>,
    ) -> Self {
        Self {
            handle: Some(handle),
            permit: Some(permit),
            pool,
        }
    }

    /// Id of the pooled handle, `None` once closed
    pub fn id(&self) -> Option<u64> {
        self.handle.as_ref().map(ConnectionHandle::id)
    }

    /// Whether the lease has been returned to the pool
    pub fn is_closed(&self) -> bool {
        self.handle.is_none()
    }

    /// Whether the lease still holds an open driver connection
    pub fn is_live(&self) -> bool {
        self.handle.as_ref().is_some_and(ConnectionHandle::is_live)
    }

    /// The underlying driver connection
    pub fn connection(&self) -> Result<&dyn Connection> {
        let handle = self.handle.as_ref().ok_or(CuttleError::UseAfterClose)?;
        handle.raw().ok_or_else(|| {
            CuttleError::Connection(format!("connection {} has been invalidated", handle.id()))
        })
    }

    pub(crate) fn live_raw(&self) -> Option<&dyn Connection> {
        self.handle
            .as_ref()
            .filter(|handle| handle.is_live())
            .and_then(ConnectionHandle::raw)
    }

    /// Execute a statement that modifies data
    pub async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        self.connection()?.execute(sql, params).await
    }

    /// Execute a query that returns rows
    pub async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.connection()?.query(sql, params).await
    }

    /// Commit the current transaction
    pub async fn commit(&self) -> Result<()> {
        self.connection()?.commit().await
    }

    /// Roll back the current transaction
    pub async fn rollback(&self) -> Result<()> {
        self.connection()?.rollback().await
    }

    /// Drop the driver connection while keeping the lease open.
    ///
    /// Use after a fatal driver error. The pool discards the handle when the
    /// lease is closed instead of handing the broken connection out again.
    /// Returns `false` if there was no connection to drop.
    pub fn invalidate(&mut self) -> bool {
        match self.handle.as_mut().and_then(ConnectionHandle::take_raw) {
            Some(raw) => {
                tracing::debug!(connection_id = ?self.id(), "invalidated pooled connection");
                drop(raw);
                true
            }
            None => false,
        }
    }

    /// Return the connection to its pool.
    ///
    /// Only the first call has an effect. If the pool itself is gone the
    /// connection is dropped.
    pub fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            match self.pool.upgrade() {
                Some(pool) => pool.release(handle),
                None => drop(handle),
            }
        }
        // Released after the handle is back in the idle queue, so the woken
        // waiter finds it there.
        self.permit.take();
    }
}

impl Drop for PoolConnection {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for PoolConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolConnection")
            .field("handle", &self.handle)
            .field("closed", &self.is_closed())
            .finish()
    }
}
