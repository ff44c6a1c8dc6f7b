//! Connection handle owned by the pool or by exactly one lease

use std::time::{Duration, Instant};

use cuttle_core::Connection;

/// A driver connection together with its pool bookkeeping
///
/// The raw connection is optional: it is taken out when the connection is
/// invalidated, after which the handle can only be discarded.
pub struct ConnectionHandle {
    id: u64,
    raw: Option<Box<dyn Connection>>,
    created_at: Instant,
    last_used_at: Instant,
}

impl ConnectionHandle {
    pub(crate) fn new(id: u64, raw: Box<dyn Connection>) -> Self {
        let now = Instant::now();
        Self {
            id,
            raw: Some(raw),
            created_at: now,
            last_used_at: now,
        }
    }

    /// Pool-unique id of this handle
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether the handle still holds an open driver connection
    pub fn is_live(&self) -> bool {
        self.raw.as_ref().is_some_and(|raw| !raw.is_closed())
    }

    /// The driver connection, if still present
    pub fn raw(&self) -> Option<&dyn Connection> {
        self.raw.as_deref()
    }

    /// Time since the driver connection was opened
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Time since the handle was last checked out or returned
    pub fn idle_time(&self) -> Duration {
        self.last_used_at.elapsed()
    }

    pub(crate) fn take_raw(&mut self) -> Option<Box<dyn Connection>> {
        self.raw.take()
    }

    pub(crate) fn touch(&mut self) {
        self.last_used_at = Instant::now();
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("driver", &self.raw.as_ref().map(|raw| raw.driver_name()))
            .field("live", &self.is_live())
            .field("age", &self.age())
            .finish()
    }
}
