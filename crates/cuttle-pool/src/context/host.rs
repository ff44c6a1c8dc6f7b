//! Host context identity, settings and teardown hooks

use std::sync::{Arc, Weak};

use cuttle_core::CuttleError;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::stack::UnitOfWork;
use crate::config::HostSettings;
use crate::registry::PoolRegistry;

/// Unique identity of a host context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HostId(Uuid);

impl HostId {
    /// Generate a new random host id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for HostId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for HostId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Callback run when a unit of work against a host ends
///
/// Hooks run on success and on failure alike; `error` carries the failure
/// the unit of work ended with, if any. Hooks must not panic.
pub trait TeardownHook: Send + Sync {
    fn teardown(&self, unit: &mut UnitOfWork, error: Option<&CuttleError>);
}

/// An application instance pool configurations can be attached to
///
/// When the last reference to a host is dropped, every pool built for it is
/// removed from the registries it was attached through and its idle
/// connections are dropped.
pub struct HostContext {
    id: HostId,
    name: String,
    settings: RwLock<HostSettings>,
    teardown_hooks: RwLock<Vec<Arc<dyn TeardownHook>>>,
    registries: Mutex<Vec<Weak<PoolRegistry>>>,
}

impl HostContext {
    /// Create a host with empty settings
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Self::with_settings(name, HostSettings::new())
    }

    /// Create a host with the given settings
    pub fn with_settings(name: impl Into<String>, settings: HostSettings) -> Arc<Self> {
        Arc::new(Self {
            id: HostId::new(),
            name: name.into(),
            settings: RwLock::new(settings),
            teardown_hooks: RwLock::new(Vec::new()),
            registries: Mutex::new(Vec::new()),
        })
    }

    pub fn id(&self) -> HostId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Snapshot of the current settings
    pub fn settings(&self) -> HostSettings {
        self.settings.read().clone()
    }

    /// Change a setting.
    ///
    /// Pools already built for this host keep the configuration they were
    /// built with.
    pub fn set_setting(&self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.settings.write().set(key, value);
    }

    /// Register a hook to run at the end of every unit of work on this host
    pub fn on_teardown(&self, hook: Arc<dyn TeardownHook>) {
        self.teardown_hooks.write().push(hook);
    }

    /// Registered teardown hooks, in registration order
    pub fn teardown_hooks(&self) -> Vec<Arc<dyn TeardownHook>> {
        self.teardown_hooks.read().clone()
    }

    /// Detach this host from `registry` when the host is dropped
    pub(crate) fn track_registry(&self, registry: &Arc<PoolRegistry>) {
        let mut registries = self.registries.lock();
        registries.retain(|tracked| tracked.strong_count() > 0);
        if !registries
            .iter()
            .any(|tracked| std::ptr::eq(tracked.as_ptr(), Arc::as_ptr(registry)))
        {
            registries.push(Arc::downgrade(registry));
        }
    }
}

impl Drop for HostContext {
    fn drop(&mut self) {
        let registries = std::mem::take(self.registries.get_mut());
        for registry in registries.iter().filter_map(Weak::upgrade) {
            registry.detach_host(self.id);
        }
    }
}

impl std::fmt::Debug for HostContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostContext")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("teardown_hooks", &self.teardown_hooks.read().len())
            .finish()
    }
}
