//! Bounded connection pool
//!
//! This module hands out driver connections from a pool bounded by
//! `capacity + overflow`, waiting up to the configured timeout when every
//! connection is checked out.
//!
//! # Example
//!
//! ```ignore
//! use cuttle_pool::{ConnectionPool, PoolConfig};
//!
//! let config = PoolConfig::new(5, 2)
//!     .with_timeout_ms(5000)
//!     .with_arg("database", "orders");
//!
//! let pool = ConnectionPool::new(config, connector);
//! let mut conn = pool.acquire().await?;
//! conn.execute("DELETE FROM carts", &[]).await?;
//! conn.commit().await?;
//! conn.close(); // or let it drop
//! ```

mod connection;
mod handle;
mod pool;
mod stats;


pub use connection::PoolConnection;
pub use handle::ConnectionHandle;
pub use pool::ConnectionPool;
pub use stats::PoolStats;
