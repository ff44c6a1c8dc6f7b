//! Per-host pool registry
//!
//! A pool configuration attached to a host gets its own pool, built the first
//! time it is used on that host.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use cuttle_core::{CuttleError, Result};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::{HostContext, HostId};
use crate::pool::ConnectionPool;

/// Identity of one pool configuration (one [`ScopedPool`](crate::ScopedPool))
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConfigId(Uuid);

impl ConfigId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ConfigId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConfigId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A registered pool, built on first access
struct PoolSlot {
    host: Weak<HostContext>,
    /// Construction lock; held while the pool is being built
    pool: Mutex<Option<ConnectionPool>>,
}

impl PoolSlot {
    fn new(host: &Arc<HostContext>) -> Self {
        Self {
            host: Arc::downgrade(host),
            pool: Mutex::new(None),
        }
    }

    /// Drop the idle connections of a built pool; leases still out keep theirs
    fn release(&self) {
        if let Some(pool) = self.pool.lock().take() {
            pool.discard_idle();
        }
    }
}

/// Maps `(host, configuration)` pairs to their lazily built pools
#[derive(Default)]
pub struct PoolRegistry {
    slots: RwLock<HashMap<(HostId, ConfigId), Arc<PoolSlot>>>,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `config` with `host` without building its pool.
    ///
    /// Returns `false` if it was already attached. Slots of hosts that no
    /// longer exist are pruned on the way.
    pub fn attach(&self, host: &Arc<HostContext>, config: ConfigId) -> bool {
        let (attached, pruned) = {
            let mut slots = self.slots.write();
            let mut pruned = Vec::new();
            slots.retain(|_, slot| {
                let alive = slot.host.strong_count() > 0;
                if !alive {
                    pruned.push(slot.clone());
                }
                alive
            });

            let attached = !slots.contains_key(&(host.id(), config));
            if attached {
                slots.insert((host.id(), config), Arc::new(PoolSlot::new(host)));
            }
            (attached, pruned)
        };

        for slot in &pruned {
            slot.release();
        }
        if !pruned.is_empty() {
            tracing::debug!(pruned = pruned.len(), "pruned pools of dropped hosts");
        }
        if attached {
            tracing::debug!(host = host.name(), %config, "pool configuration attached");
        }
        attached
    }

    pub fn is_attached(&self, host: HostId, config: ConfigId) -> bool {
        self.slots.read().contains_key(&(host, config))
    }

    /// Whether the pool for `(host, config)` has been built
    pub fn is_built(&self, host: HostId, config: ConfigId) -> bool {
        self.slot(host, config)
            .is_some_and(|slot| slot.pool.lock().is_some())
    }

    /// The built pool for `(host, config)`, if any
    pub fn get(&self, host: HostId, config: ConfigId) -> Option<ConnectionPool> {
        self.slot(host, config)
            .and_then(|slot| slot.pool.lock().clone())
    }

    /// Get the pool for `(host, config)`, building it with `build` on first use.
    ///
    /// Concurrent first calls build the pool once; the others wait for it.
    /// A failed build leaves the slot unbuilt so a later call can retry.
    /// Fails with [`CuttleError::ContextMismatch`] if `config` was never
    /// attached to `host`.
    pub fn get_or_create<F>(
        &self,
        host: &HostContext,
        config: ConfigId,
        build: F,
    ) -> Result<ConnectionPool>
    where
        F: FnOnce() -> Result<ConnectionPool>,
    {
        let slot = self.slot(host.id(), config).ok_or_else(|| {
            CuttleError::ContextMismatch(format!(
                "pool configuration {} is not attached to host '{}'",
                config,
                host.name()
            ))
        })?;

        let mut pool = slot.pool.lock();
        if let Some(pool) = pool.as_ref() {
            return Ok(pool.clone());
        }

        let built = build()?;
        tracing::debug!(
            host = host.name(),
            pool = built.name(),
            capacity = built.config().capacity(),
            overflow = built.config().overflow(),
            "pool built"
        );
        *pool = Some(built.clone());
        Ok(built)
    }

    /// Forget every pool attached to `host`, returning how many were removed.
    ///
    /// Idle connections of the removed pools are dropped. Connections still
    /// checked out stay usable and are dropped when their leases close.
    /// Runs automatically when a host initialized through a
    /// [`ScopedPool`](crate::ScopedPool) is dropped.
    pub fn detach_host(&self, host: HostId) -> usize {
        let removed: Vec<_> = {
            let mut slots = self.slots.write();
            let keys: Vec<_> = slots
                .keys()
                .filter(|(slot_host, _)| *slot_host == host)
                .copied()
                .collect();
            keys.iter().filter_map(|key| slots.remove(key)).collect()
        };

        for slot in &removed {
            slot.release();
        }
        if !removed.is_empty() {
            tracing::debug!(%host, removed = removed.len(), "host detached");
        }
        removed.len()
    }

    /// Number of attached `(host, configuration)` pairs
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }

    fn slot(&self, host: HostId, config: ConfigId) -> Option<Arc<PoolSlot>> {
        self.slots.read().get(&(host, config)).cloned()
    }
}

impl std::fmt::Debug for PoolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolRegistry")
            .field("slots", &self.len())
            .finish()
    }
}
