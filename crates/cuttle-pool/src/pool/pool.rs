//! Connection pool implementation

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use cuttle_core::{ConnectionArgs, Connector, CuttleError, Result};
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::connection::PoolConnection;
use super::handle::ConnectionHandle;
use super::stats::PoolStats;
use crate::config::PoolConfig;
use crate::health::{ConnectionHooks, DefaultHooks};

/// Mutable pool state, guarded by a single lock
#[derive(Default)]
struct PoolState {
    /// Handles available for checkout, oldest first
    idle: VecDeque<ConnectionHandle>,
    /// Slots taken by checked-out or in-flight connections
    outstanding: usize,
    waiting: usize,
    created: u64,
    discarded: u64,
    timeouts: u64,
}

/// State shared between a pool and the connections it hands out
pub(crate) struct PoolShared {
    name: String,
    config: PoolConfig,
    connector: Arc<dyn Connector>,
    hooks: Arc<dyn ConnectionHooks>,
    state: Mutex<PoolState>,
    /// One permit per connection that may exist; waiters queue here in FIFO order
    permits: Arc<Semaphore>,
    next_id: AtomicU64,
}

impl PoolShared {
    /// Take a handle back from a closing lease.
    ///
    /// Dead handles and handles beyond capacity are discarded; everything else
    /// goes to the back of the idle queue. The caller drops its permit
    /// afterwards, which wakes the next waiter.
    pub(crate) fn release(&self, mut handle: ConnectionHandle) {
        let mut state = self.state.lock();
        state.outstanding = state.outstanding.saturating_sub(1);

        let discard_reason = if !handle.is_live() {
            Some("connection closed")
        } else if state.outstanding + state.idle.len() >= self.config.capacity() {
            Some("over capacity")
        } else {
            None
        };

        match discard_reason {
            None => {
                handle.touch();
                tracing::trace!(
                    pool = %self.name,
                    connection_id = handle.id(),
                    outstanding = state.outstanding,
                    idle = state.idle.len() + 1,
                    "connection returned to pool"
                );
                state.idle.push_back(handle);
            }
            Some(reason) => {
                state.discarded += 1;
                let outstanding = state.outstanding;
                drop(state);
                tracing::debug!(
                    pool = %self.name,
                    connection_id = handle.id(),
                    outstanding,
                    reason,
                    "discarding returned connection"
                );
                drop(handle.take_raw());
            }
        }
    }

    fn discard(&self, mut handle: ConnectionHandle) {
        self.state.lock().discarded += 1;
        drop(handle.take_raw());
    }
}

/// Keeps a capacity slot reserved until the checkout completes.
///
/// Dropping it without `commit` (error or cancelled acquire) gives the slot back.
struct SlotReservation<'a> {
    shared: &'a PoolShared,
    committed: bool,
}

impl<'a> SlotReservation<'a> {
    fn reserve(shared: &'a PoolShared) -> (Self, Option<ConnectionHandle>) {
        let mut state = shared.state.lock();
        state.outstanding += 1;
        let reused = state.idle.pop_front();
        drop(state);
        (
            Self {
                shared,
                committed: false,
            },
            reused,
        )
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for SlotReservation<'_> {
    fn drop(&mut self) {
        if !self.committed {
            let mut state = self.shared.state.lock();
            state.outstanding = state.outstanding.saturating_sub(1);
        }
    }
}

/// Counts a caller as waiting for as long as it is alive
struct WaitingGuard<'a>(&'a PoolShared);

impl<'a> WaitingGuard<'a> {
    fn new(shared: &'a PoolShared) -> Self {
        shared.state.lock().waiting += 1;
        Self(shared)
    }
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.0.state.lock();
        state.waiting = state.waiting.saturating_sub(1);
    }
}

/// A connection pool that manages a bounded set of driver connections
///
/// At most `capacity + overflow` connections exist at once. Up to `capacity`
/// returned connections are kept idle for reuse; overflow connections are
/// closed when they come back. Cloning the pool is cheap and every clone
/// shares the same connections.
#[derive(Clone)]
pub struct ConnectionPool {
    shared: Arc<PoolShared>,
}

impl ConnectionPool {
    /// Create a new connection pool with the given configuration and connector
    ///
    /// # Panics
    ///
    /// Panics if the configuration does not pass [`PoolConfig::validate`].
    /// Use [`ConnectionPool::try_new`] for configurations read at runtime.
    pub fn new<C: Connector>(config: PoolConfig, connector: C) -> Self {
        Self::with_hooks(config, connector, DefaultHooks)
    }

    /// Create a pool that pings and normalizes connections with `hooks`
    ///
    /// # Panics
    ///
    /// Panics if the configuration does not pass [`PoolConfig::validate`].
    pub fn with_hooks<C: Connector, H: ConnectionHooks>(
        config: PoolConfig,
        connector: C,
        hooks: H,
    ) -> Self {
        match Self::try_with_hooks(config, connector, hooks) {
            Ok(pool) => pool,
            Err(e) => panic!("{}", e),
        }
    }

    /// Create a pool, failing with [`CuttleError::Configuration`] on an invalid configuration
    pub fn try_new<C: Connector>(config: PoolConfig, connector: C) -> Result<Self> {
        Self::try_with_hooks(config, connector, DefaultHooks)
    }

    /// Fallible form of [`ConnectionPool::with_hooks`]
    pub fn try_with_hooks<C: Connector, H: ConnectionHooks>(
        config: PoolConfig,
        connector: C,
        hooks: H,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_parts(
            "default",
            config,
            Arc::new(connector),
            Arc::new(hooks),
        ))
    }

    pub(crate) fn from_parts(
        name: impl Into<String>,
        config: PoolConfig,
        connector: Arc<dyn Connector>,
        hooks: Arc<dyn ConnectionHooks>,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_size()));
        Self {
            shared: Arc::new(PoolShared {
                name: name.into(),
                config,
                connector,
                hooks,
                state: Mutex::new(PoolState::default()),
                permits,
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Check out a connection
    ///
    /// This will:
    /// 1. Reuse the oldest idle connection if it answers a ping, replacing it
    ///    with a fresh connection in the same slot if it does not
    /// 2. If none is idle and fewer than `capacity + overflow` exist, open a new one
    /// 3. Otherwise wait for a connection to be returned, up to the timeout
    ///
    /// Every connection is normalized before it is handed out. Returns
    /// [`CuttleError::PoolExhausted`] if the timeout elapses first.
    #[tracing::instrument(skip(self), fields(pool = %self.shared.name))]
    pub async fn acquire(&self) -> Result<PoolConnection> {
        let permit = self.acquire_permit().await?;
        let (reservation, reused) = SlotReservation::reserve(&self.shared);

        let handle = self.checkout(reused).await?;
        reservation.commit();

        tracing::debug!(connection_id = handle.id(), "connection checked out");
        Ok(PoolConnection::new(
            handle,
            permit,
            Arc::downgrade(&self.shared),
        ))
    }

    async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit> {
        if let Ok(permit) = self.shared.permits.clone().try_acquire_owned() {
            return Ok(permit);
        }

        let _waiting = WaitingGuard::new(&self.shared);
        let permits = self.shared.permits.clone();
        let acquired = match self.shared.config.timeout() {
            Some(timeout) => tokio::time::timeout(timeout, permits.acquire_owned())
                .await
                .map_err(|_| timeout),
            None => Ok(permits.acquire_owned().await),
        };

        match acquired {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) => Err(CuttleError::Other("pool semaphore closed".into())),
            Err(timeout) => {
                self.shared.state.lock().timeouts += 1;
                tracing::warn!(?timeout, "timed out waiting for a connection");
                Err(CuttleError::PoolExhausted { timeout })
            }
        }
    }

    async fn checkout(&self, reused: Option<ConnectionHandle>) -> Result<ConnectionHandle> {
        let mut handle = match reused {
            Some(handle) => {
                if self.ping_handle(&handle).await {
                    handle
                } else {
                    tracing::warn!(
                        connection_id = handle.id(),
                        "idle connection failed liveness check, replacing it"
                    );
                    self.shared.discard(handle);
                    self.connect().await?
                }
            }
            None => self.connect().await?,
        };

        if let Some(raw) = handle.raw() {
            if let Err(e) = self.shared.hooks.normalize(raw).await {
                tracing::warn!(connection_id = handle.id(), error = %e, "failed to normalize connection");
                self.shared.discard(handle);
                return Err(e);
            }
        }

        handle.touch();
        Ok(handle)
    }

    async fn connect(&self) -> Result<ConnectionHandle> {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let raw = self
            .shared
            .connector
            .connect(self.shared.config.connection_args())
            .await
            .map_err(|e| {
                tracing::error!(connection_id = id, error = %e, "failed to open connection");
                e
            })?;

        self.shared.state.lock().created += 1;
        tracing::debug!(connection_id = id, driver = raw.driver_name(), "opened new connection");
        Ok(ConnectionHandle::new(id, raw))
    }

    async fn ping_handle(&self, handle: &ConnectionHandle) -> bool {
        match handle.raw() {
            Some(raw) if !raw.is_closed() => self.shared.hooks.ping(raw).await,
            _ => false,
        }
    }

    /// Check whether a checked-out connection is still alive
    ///
    /// Runs the pool's ping hook. Returns `false` without calling the hook
    /// when the connection has been closed or invalidated.
    pub async fn ping(&self, conn: &PoolConnection) -> bool {
        match conn.live_raw() {
            Some(raw) => self.shared.hooks.ping(raw).await,
            None => false,
        }
    }

    /// Run the pool's normalize hook on a checked-out connection
    pub async fn normalize(&self, conn: &PoolConnection) -> Result<()> {
        let raw = conn.connection()?;
        self.shared.hooks.normalize(raw).await
    }

    /// Get current pool statistics
    pub fn stats(&self) -> PoolStats {
        let state = self.shared.state.lock();
        PoolStats::new(
            state.idle.len(),
            state.outstanding,
            state.waiting,
            state.created,
            state.discarded,
            state.timeouts,
        )
    }

    /// Get the pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Get the arguments this pool passes to its connector
    pub fn connection_args(&self) -> &ConnectionArgs {
        self.shared.config.connection_args()
    }

    /// Name used for this pool in logs
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Whether two values refer to the same pool
    pub fn ptr_eq(&self, other: &ConnectionPool) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Drop every idle connection without waiting on the driver.
    ///
    /// Returns how many were dropped. Checked-out connections are untouched.
    pub fn discard_idle(&self) -> usize {
        let handles = self.drain_idle();
        let count = handles.len();
        if count > 0 {
            tracing::debug!(pool = %self.shared.name, count, "dropping idle connections");
        }
        drop(handles);
        count
    }

    /// Close all idle connections in the pool
    pub async fn close_idle(&self) {
        for mut handle in self.drain_idle() {
            if let Some(raw) = handle.take_raw() {
                if let Err(e) = raw.close().await {
                    tracing::debug!(connection_id = handle.id(), error = %e, "error closing idle connection");
                }
            }
        }
    }

    /// Take every idle handle, counting them as discarded
    fn drain_idle(&self) -> Vec<ConnectionHandle> {
        let mut state = self.shared.state.lock();
        let drained: Vec<_> = state.idle.drain(..).collect();
        state.discarded += drained.len() as u64;
        drained
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("name", &self.shared.name)
            .field("config", &self.shared.config)
            .field("stats", &self.stats())
            .finish()
    }
}
