//! Liveness checks and normalization for pooled connections
//!
//! The pool calls a [`ConnectionHooks`] implementation before handing a
//! connection out: `ping` decides whether an idle connection may be reused,
//! `normalize` resets session state left behind by the previous user.
//!
//! # Example
//!
//! ```ignore
//! use cuttle_pool::health::QueryHooks;
//!
//! // Ping with SELECT 1 and restore autocommit on every checkout
//! let hooks = QueryHooks::new().with_reset_statement("SET autocommit = 1");
//! let pool = ScopedPool::builder(connector).hooks(hooks).build()?;
//! ```

mod hooks;
mod ping;

#[cfg(test)]
mod tests;

pub use hooks::{ConnectionHooks, DefaultHooks, QueryHooks};
pub use ping::{PingError, PingResult, ping_database};
