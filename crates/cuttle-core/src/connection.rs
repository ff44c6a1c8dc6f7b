//! Connection and connector traits implemented by drivers

use std::sync::Arc;

use async_trait::async_trait;

use crate::{ConnectionArgs, QueryResult, Result, StatementResult, Value};

/// An opaque, driver-owned database connection
///
/// The pool never interprets what a connection does; it only moves it between
/// callers and asks it whether it is still open. Dropping a connection must
/// release its underlying resources.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the driver name (e.g., "sqlite", "postgresql", "mysql")
    fn driver_name(&self) -> &str;

    /// Execute a statement that modifies data (INSERT/UPDATE/DELETE)
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult>;

    /// Execute a query that returns rows (SELECT)
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Commit the current transaction
    async fn commit(&self) -> Result<()>;

    /// Roll back the current transaction
    async fn rollback(&self) -> Result<()> {
        tracing::debug!(driver = self.driver_name(), "rollback not supported, ignoring");
        Ok(())
    }

    /// Close the connection
    async fn close(&self) -> Result<()>;

    /// Check if the connection is closed
    fn is_closed(&self) -> bool;
}

/// Driver factory that opens new connections
///
/// Called once per connection the pool creates; it may perform network I/O
/// and must be safe to call repeatedly and concurrently.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a new connection using the given arguments
    async fn connect(&self, args: &ConnectionArgs) -> Result<Box<dyn Connection>>;
}

#[async_trait]
impl<T: Connector> Connector for Arc<T> {
    async fn connect(&self, args: &ConnectionArgs) -> Result<Box<dyn Connection>> {
        (**self).connect(args).await
    }
}
