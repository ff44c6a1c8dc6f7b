//! Cuttle Pool - Connection pooling bound to units of work
//!
//! This crate hands out expensive driver connections from a bounded pool and
//! ties each checked-out connection to the unit of work (request, task) that
//! uses it, so the connection goes back to the pool exactly once when the
//! unit of work ends.
//!
//! # Example
//!
//! ```ignore
//! use cuttle_pool::{ContextStack, HostContext, HostSettings, ScopedPool};
//!
//! let pool = ScopedPool::builder(my_connector)
//!     .capacity(5)
//!     .overflow(2)
//!     .arg("database", "rons_house")
//!     .build()?;
//!
//! let host = HostContext::with_settings(
//!     "app",
//!     HostSettings::new().with("CUTTLEPOOL_DATABASE", "steakhouse"),
//! );
//! pool.init_host(&host);
//!
//! let mut stack = ContextStack::new();
//! stack.push(host.clone());
//! if let Some(conn) = pool.current_connection(&mut stack).await? {
//!     conn.execute("INSERT INTO orders VALUES (1)", &[]).await?;
//! }
//! pool.commit(&stack).await?;
//! stack.pop(None); // returns the connection to the pool
//! ```

mod binder;
mod config;
pub mod context;
pub mod health;
pub mod pool;
mod registry;

#[cfg(test)]
mod test_support;

pub use binder::{ScopedPool, ScopedPoolBuilder};
pub use config::{DEFAULT_CAPACITY, DEFAULT_OVERFLOW, HostSettings, OVERRIDE_PREFIX, PoolConfig};
pub use context::{ContextStack, HostContext, HostId, TeardownHook, UnitOfWork};
pub use health::{ConnectionHooks, DefaultHooks, PingError, PingResult, QueryHooks, ping_database};
pub use pool::{ConnectionHandle, ConnectionPool, PoolConnection, PoolStats};
pub use registry::{ConfigId, PoolRegistry};
