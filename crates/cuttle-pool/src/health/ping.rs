//! Round-trip probe against a live connection

use std::time::{Duration, Instant};

use cuttle_core::{Connection, CuttleError};
use thiserror::Error;

/// Round-trip time of a successful probe
pub type PingResult = Result<Duration, PingError>;

#[derive(Error, Debug)]
pub enum PingError {
    #[error("connection reports itself closed")]
    Closed,

    #[error("probe query failed: {0}")]
    Failed(#[source] CuttleError),
}

/// Run the cheapest query the driver understands and time it.
///
/// Closed connections fail without touching the driver.
pub async fn ping_database(conn: &dyn Connection) -> PingResult {
    if conn.is_closed() {
        return Err(PingError::Closed);
    }

    let started = Instant::now();
    conn.query(probe_query(conn.driver_name()), &[])
        .await
        .map_err(PingError::Failed)?;
    Ok(started.elapsed())
}

/// Some dialects cannot `SELECT` without a table.
pub(super) fn probe_query(driver: &str) -> &'static str {
    match driver {
        "oracle" => "SELECT 1 FROM DUAL",
        "firebird" => "SELECT 1 FROM RDB$DATABASE",
        _ => "SELECT 1",
    }
}
