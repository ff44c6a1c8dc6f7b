//! Task-scoped connection binding
//!
//! A [`ScopedPool`] is one pool configuration that can be attached to many
//! hosts. Within a unit of work it hands out a single connection, reused on
//! every access and returned to the host's pool when the unit of work ends.

mod scoped_pool;


pub use scoped_pool::{ScopedPool, ScopedPoolBuilder};
