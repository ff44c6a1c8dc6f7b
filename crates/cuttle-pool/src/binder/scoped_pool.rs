//! Binder between pool configurations, hosts and units of work

use std::sync::Arc;
use std::time::Duration;

use cuttle_core::{Connector, CuttleError, Result};

use crate::config::PoolConfig;
use crate::context::{ContextStack, HostContext, TeardownHook, UnitOfWork};
use crate::health::{ConnectionHooks, DefaultHooks};
use crate::pool::{ConnectionPool, PoolConnection};
use crate::registry::{ConfigId, PoolRegistry};

struct BinderInner {
    id: ConfigId,
    name: String,
    connector: Arc<dyn Connector>,
    config: PoolConfig,
    hooks: Arc<dyn ConnectionHooks>,
    registry: Arc<PoolRegistry>,
    default_host: Option<Arc<HostContext>>,
}

/// A pool configuration usable across hosts and units of work
///
/// Each host the binder is attached to gets its own pool, built on first use
/// from the binder's [`PoolConfig`] overridden by the host's `CUTTLEPOOL_*`
/// settings. Cloning is cheap; clones share the same identity.
#[derive(Clone)]
pub struct ScopedPool {
    inner: Arc<BinderInner>,
}

impl ScopedPool {
    /// Start building a binder around `connector`
    pub fn builder<C: Connector>(connector: C) -> ScopedPoolBuilder {
        ScopedPoolBuilder::new(Arc::new(connector))
    }

    pub fn id(&self) -> ConfigId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Static configuration, before host overrides
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &Arc<PoolRegistry> {
        &self.inner.registry
    }

    /// Host used when no unit of work is active
    pub fn default_host(&self) -> Option<&Arc<HostContext>> {
        self.inner.default_host.as_ref()
    }

    /// Attach this configuration to `host`.
    ///
    /// The pool itself is built lazily. Also registers the teardown hook that
    /// returns bound connections at the end of each unit of work. Calling it
    /// again for the same host does nothing. Dropping the host detaches it
    /// from this binder's registry.
    pub fn init_host(&self, host: &Arc<HostContext>) {
        if self.inner.registry.attach(host, self.inner.id) {
            host.track_registry(&self.inner.registry);
            host.on_teardown(Arc::new(ReleaseBinding {
                config: self.inner.id,
            }));
        }
    }

    /// Pool for the current unit of work's host, or the default host
    pub fn get_pool(&self, stack: &ContextStack) -> Result<ConnectionPool> {
        let host = stack
            .current_host()
            .or(self.inner.default_host.as_ref())
            .ok_or_else(|| {
                CuttleError::Configuration(format!(
                    "pool '{}' used with no active unit of work and no default host",
                    self.inner.name
                ))
            })?;
        self.pool_for(host)
    }

    /// Check out a connection the caller closes itself.
    ///
    /// The connection is not bound to the unit of work.
    pub async fn get_connection(&self, stack: &ContextStack) -> Result<PoolConnection> {
        self.get_pool(stack)?.acquire().await
    }

    /// The connection bound to the innermost unit of work
    ///
    /// Returns `Ok(None)` outside any unit of work. Binds a new connection on
    /// first access. A bound connection that was closed, invalidated or fails
    /// its ping is closed and replaced.
    #[tracing::instrument(skip(self, stack), fields(pool = %self.inner.name, depth = stack.depth()))]
    pub async fn current_connection<'s>(
        &self,
        stack: &'s mut ContextStack,
    ) -> Result<Option<&'s mut PoolConnection>> {
        let id = self.inner.id;
        let Some(unit) = stack.top_mut() else {
            return Ok(None);
        };
        let pool = self.pool_for(unit.host())?;

        let reusable = match unit.binding(id) {
            Some(conn) => pool.ping(conn).await,
            None => false,
        };

        if !reusable {
            if let Some(mut stale) = unit.unbind(id) {
                tracing::warn!(connection_id = ?stale.id(), "bound connection is no longer usable, replacing it");
                stale.close();
            }
            let conn = pool.acquire().await?;
            tracing::debug!(connection_id = ?conn.id(), "connection bound to unit of work");
            unit.bind(id, conn);
        }

        Ok(unit.binding_mut(id))
    }

    /// Commit the connection bound to the innermost unit of work.
    ///
    /// Never checks out a connection; fails with
    /// [`CuttleError::NoActiveConnection`] when nothing is bound.
    pub async fn commit(&self, stack: &ContextStack) -> Result<()> {
        let conn = stack
            .top()
            .and_then(|unit| unit.binding(self.inner.id))
            .ok_or(CuttleError::NoActiveConnection)?;
        conn.commit().await
    }

    /// Return the connection bound to `unit`, if any.
    ///
    /// Runs automatically when a unit of work on an initialized host ends.
    pub fn teardown(&self, unit: &mut UnitOfWork) -> bool {
        release_binding(unit, self.inner.id)
    }

    fn pool_for(&self, host: &HostContext) -> Result<ConnectionPool> {
        self.inner.registry.get_or_create(host, self.inner.id, || {
            let config = self.inner.config.with_overrides(&host.settings())?;
            Ok(ConnectionPool::from_parts(
                format!("{}@{}", self.inner.name, host.name()),
                config,
                self.inner.connector.clone(),
                self.inner.hooks.clone(),
            ))
        })
    }
}

impl std::fmt::Debug for ScopedPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedPool")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("config", &self.inner.config)
            .finish()
    }
}

fn release_binding(unit: &mut UnitOfWork, config: ConfigId) -> bool {
    match unit.unbind(config) {
        Some(mut conn) => {
            tracing::debug!(connection_id = ?conn.id(), depth = unit.depth(), "releasing bound connection");
            conn.close();
            true
        }
        None => false,
    }
}

/// Teardown hook registered with each initialized host
struct ReleaseBinding {
    config: ConfigId,
}

impl TeardownHook for ReleaseBinding {
    fn teardown(&self, unit: &mut UnitOfWork, error: Option<&CuttleError>) {
        if let Some(error) = error {
            tracing::debug!(%error, "unit of work failed");
        }
        release_binding(unit, self.config);
    }
}

/// Builder for [`ScopedPool`]
pub struct ScopedPoolBuilder {
    connector: Arc<dyn Connector>,
    config: PoolConfig,
    hooks: Arc<dyn ConnectionHooks>,
    registry: Option<Arc<PoolRegistry>>,
    host: Option<Arc<HostContext>>,
    name: Option<String>,
}

impl ScopedPoolBuilder {
    fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            config: PoolConfig::default(),
            hooks: Arc::new(DefaultHooks),
            registry: None,
            host: None,
            name: None,
        }
    }

    /// Connections kept in each host's pool
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.set_capacity(capacity);
        self
    }

    /// Extra connections allowed while a pool is exhausted
    pub fn overflow(mut self, overflow: usize) -> Self {
        self.config.set_overflow(overflow);
        self
    }

    /// How long `acquire` waits for a connection
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_timeout(timeout);
        self
    }

    pub fn wait_forever(mut self) -> Self {
        self.config = self.config.wait_forever();
        self
    }

    /// Add a connector argument
    pub fn arg(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.config = self.config.with_arg(key, value);
        self
    }

    /// Replace the whole pool configuration
    pub fn config(mut self, config: PoolConfig) -> Self {
        self.config = config;
        self
    }

    pub fn hooks<H: ConnectionHooks>(mut self, hooks: H) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    /// Share a registry with other binders
    pub fn registry(mut self, registry: Arc<PoolRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Default host, used when no unit of work is active. It is initialized on build.
    pub fn host(mut self, host: Arc<HostContext>) -> Self {
        self.host = Some(host);
        self
    }

    /// Name used in logs
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn build(self) -> Result<ScopedPool> {
        self.config.validate()?;

        let id = ConfigId::new();
        let pool = ScopedPool {
            inner: Arc::new(BinderInner {
                id,
                name: self.name.unwrap_or_else(|| format!("pool-{}", id)),
                connector: self.connector,
                config: self.config,
                hooks: self.hooks,
                registry: self.registry.unwrap_or_default(),
                default_host: self.host,
            }),
        };

        if let Some(host) = pool.default_host() {
            pool.init_host(host);
        }
        Ok(pool)
    }
}
