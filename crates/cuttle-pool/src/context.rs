//! Host contexts and units of work
//!
//! A [`HostContext`] stands for one application instance: it has an
//! identity, [`HostSettings`](crate::HostSettings) and teardown hooks. Work
//! against a host runs inside a [`UnitOfWork`] pushed onto a caller-owned
//! [`ContextStack`]; popping the unit runs the host's teardown hooks, which
//! is where bound connections go back to their pools.
//!
//! # Example
//!
//! ```ignore
//! let host = HostContext::new("app");
//! let mut stack = ContextStack::new();
//!
//! stack.push(host.clone());
//! // ... work that binds connections to the top unit of work ...
//! stack.pop(None);
//! ```

mod host;
mod stack;

#[cfg(test)]
mod tests;

pub use host::{HostContext, HostId, TeardownHook};
pub use stack::{ContextStack, UnitOfWork};
