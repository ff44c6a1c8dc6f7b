//! Stack of active units of work

use std::collections::HashMap;
use std::sync::Arc;

use cuttle_core::CuttleError;

use super::host::HostContext;
use crate::pool::PoolConnection;
use crate::registry::ConfigId;

/// One request or task running against a host
///
/// Holds at most one bound connection per pool configuration. Connections
/// still bound when the unit is dropped are closed by their own `Drop`.
#[derive(Debug)]
pub struct UnitOfWork {
    host: Arc<HostContext>,
    bindings: HashMap<ConfigId, PoolConnection>,
    depth: usize,
}

impl UnitOfWork {
    fn new(host: Arc<HostContext>, depth: usize) -> Self {
        Self {
            host,
            bindings: HashMap::new(),
            depth,
        }
    }

    pub fn host(&self) -> &Arc<HostContext> {
        &self.host
    }

    /// Position in the stack, 1 for the outermost unit
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn binding(&self, config: ConfigId) -> Option<&PoolConnection> {
        self.bindings.get(&config)
    }

    pub fn binding_mut(&mut self, config: ConfigId) -> Option<&mut PoolConnection> {
        self.bindings.get_mut(&config)
    }

    /// Bind a connection, returning the one it replaces
    pub fn bind(&mut self, config: ConfigId, conn: PoolConnection) -> Option<PoolConnection> {
        self.bindings.insert(config, conn)
    }

    pub fn unbind(&mut self, config: ConfigId) -> Option<PoolConnection> {
        self.bindings.remove(&config)
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }
}

/// Units of work active in one task, innermost last
///
/// Each task owns its stack, so bindings are never shared between tasks.
/// Dropping the stack ends every unit still on it.
#[derive(Debug, Default)]
pub struct ContextStack {
    frames: Vec<UnitOfWork>,
}

impl ContextStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a unit of work against `host`, returning the new depth
    pub fn push(&mut self, host: Arc<HostContext>) -> usize {
        let depth = self.frames.len() + 1;
        tracing::trace!(host = host.name(), depth, "unit of work started");
        self.frames.push(UnitOfWork::new(host, depth));
        depth
    }

    /// End the innermost unit of work.
    ///
    /// Runs the host's teardown hooks with `error` whether or not the unit
    /// failed, then drops the unit. Returns the host it ran against, or
    /// `None` if the stack was empty.
    pub fn pop(&mut self, error: Option<&CuttleError>) -> Option<Arc<HostContext>> {
        let mut unit = self.frames.pop()?;
        let hooks = unit.host.teardown_hooks();
        tracing::trace!(
            host = unit.host.name(),
            depth = unit.depth,
            hooks = hooks.len(),
            failed = error.is_some(),
            "unit of work ended"
        );

        for hook in hooks {
            hook.teardown(&mut unit, error);
        }

        let host = unit.host.clone();
        drop(unit);
        Some(host)
    }

    /// The innermost unit of work
    pub fn top(&self) -> Option<&UnitOfWork> {
        self.frames.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut UnitOfWork> {
        self.frames.last_mut()
    }

    /// Host of the innermost unit of work
    pub fn current_host(&self) -> Option<&Arc<HostContext>> {
        self.top().map(UnitOfWork::host)
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl Drop for ContextStack {
    fn drop(&mut self) {
        while self.pop(None).is_some() {}
    }
}
