//! Cuttle Core - Driver-facing abstractions for the connection pool
//!
//! This crate provides the traits and types that the pool and every driver
//! integration depend on. It defines:
//!
//! - `Connection` - Trait for an opaque, driver-owned connection
//! - `Connector` - Trait for the driver factory that opens connections
//! - `ConnectionArgs` - Keyword arguments forwarded verbatim to the driver
//! - `CuttleError` - The error taxonomy shared by the pool and drivers
//! - `Value`, `QueryResult`, `StatementResult` - What flows through a connection

mod args;
mod connection;
mod error;
mod types;

pub use args::*;
pub use connection::*;
pub use error::*;
pub use types::*;
