//! Pool configuration and host settings

use std::collections::BTreeMap;
use std::time::Duration;

use cuttle_core::{ConnectionArgs, CuttleError, Result};
use serde::{Deserialize, Serialize};

/// Default number of connections kept in a pool
pub const DEFAULT_CAPACITY: usize = 1;

/// Default number of extra connections allowed beyond capacity
pub const DEFAULT_OVERFLOW: usize = 0;

/// Host settings starting with this prefix override pool configuration.
///
/// `CUTTLEPOOL_HOST = "db1"` becomes the connection argument `host = "db1"`.
/// `CUTTLEPOOL_CAPACITY`, `CUTTLEPOOL_OVERFLOW` and `CUTTLEPOOL_TIMEOUT`
/// (seconds, or null to wait forever) resize the pool instead.
pub const OVERRIDE_PREFIX: &str = "CUTTLEPOOL_";

// Keeps the permit count well under tokio's semaphore limit.
const MAX_POOL_SIZE: usize = 1 << 20;

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

/// Configuration for a connection pool
///
/// Controls pool sizing, the acquire timeout, and the arguments passed to the
/// driver connector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum number of connections kept in the pool
    #[serde(default = "default_capacity")]
    capacity: usize,
    /// Extra connections that may be created when the pool is exhausted
    #[serde(default)]
    overflow: usize,
    /// Timeout in milliseconds when waiting for a connection; `None` waits forever
    #[serde(default)]
    timeout_ms: Option<u64>,
    /// Arguments forwarded verbatim to the connector
    #[serde(default)]
    connection_args: ConnectionArgs,
}

impl PoolConfig {
    /// Create a new pool configuration with the given capacity and overflow
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize, overflow: usize) -> Self {
        assert!(
            capacity > 0,
            "capacity must be greater than 0, got {}",
            capacity
        );

        Self {
            capacity,
            overflow,
            timeout_ms: None,
            connection_args: ConnectionArgs::new(),
        }
    }

    /// Set the acquire timeout in milliseconds
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Set the acquire timeout
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_timeout_ms(duration_to_ms(timeout))
    }

    /// Wait for a connection as long as it takes
    pub fn wait_forever(mut self) -> Self {
        self.timeout_ms = None;
        self
    }

    /// Add a connector argument
    pub fn with_arg(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.connection_args.insert(key, value);
        self
    }

    /// Replace all connector arguments
    pub fn with_connection_args(mut self, args: ConnectionArgs) -> Self {
        self.connection_args = args;
        self
    }

    pub(crate) fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
    }

    pub(crate) fn set_overflow(&mut self, overflow: usize) {
        self.overflow = overflow;
    }

    /// Get the pool capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get the overflow allowance
    pub fn overflow(&self) -> usize {
        self.overflow
    }

    /// Maximum number of connections that can exist at once
    pub fn max_size(&self) -> usize {
        self.capacity.saturating_add(self.overflow)
    }

    /// Get the acquire timeout, `None` meaning wait forever
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Get the connector arguments
    pub fn connection_args(&self) -> &ConnectionArgs {
        &self.connection_args
    }

    /// Check that the configuration describes a usable pool.
    ///
    /// `new` enforces this already; deserialized and overridden configs are
    /// checked here.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(CuttleError::Configuration(
                "capacity must be greater than 0".into(),
            ));
        }
        if self.max_size() > MAX_POOL_SIZE {
            return Err(CuttleError::Configuration(format!(
                "capacity + overflow must not exceed {}, got {}",
                MAX_POOL_SIZE,
                self.max_size()
            )));
        }
        Ok(())
    }

    /// Apply the `CUTTLEPOOL_*` overrides found in host settings.
    ///
    /// Sizing keys update the pool, every other key is merged into the
    /// connector arguments with the override winning.
    pub fn with_overrides(&self, settings: &HostSettings) -> Result<Self> {
        let mut config = self.clone();

        for (key, value) in settings.prefixed(OVERRIDE_PREFIX) {
            let key = key.to_lowercase();
            match key.as_str() {
                "capacity" => config.capacity = parse_count(&key, value)?,
                "overflow" => config.overflow = parse_count(&key, value)?,
                "timeout" => config.timeout_ms = parse_timeout(value)?,
                _ => {
                    config.connection_args.insert(key, value.clone());
                }
            }
        }

        config.validate()?;
        Ok(config)
    }
}

impl Default for PoolConfig {
    /// Create a default pool configuration
    ///
    /// Defaults:
    /// - capacity: 1
    /// - overflow: 0
    /// - timeout: wait forever
    /// - connection_args: empty
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_OVERFLOW)
    }
}

fn duration_to_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn parse_count(key: &str, value: &serde_json::Value) -> Result<usize> {
    let parsed = match value {
        serde_json::Value::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
        serde_json::Value::String(s) => s.trim().parse::<usize>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| {
        CuttleError::Configuration(format!(
            "{}{} must be a non-negative integer, got {}",
            OVERRIDE_PREFIX,
            key.to_uppercase(),
            value
        ))
    })
}

fn parse_timeout(value: &serde_json::Value) -> Result<Option<u64>> {
    let seconds = match value {
        serde_json::Value::Null => return Ok(None),
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) if s.trim().eq_ignore_ascii_case("none") => return Ok(None),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    // Rejects NaN, negatives and values too large for a Duration
    match seconds.and_then(|seconds| Duration::try_from_secs_f64(seconds).ok()) {
        Some(timeout) => Ok(Some(duration_to_ms(timeout))),
        None => Err(CuttleError::Configuration(format!(
            "{}TIMEOUT must be a number of seconds or null, got {}",
            OVERRIDE_PREFIX, value
        ))),
    }
}

/// Key/value settings of a host context
///
/// Settings are opaque to the pool except for keys carrying
/// [`OVERRIDE_PREFIX`], which override pool configuration when a host's pool
/// is built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostSettings(BTreeMap<String, serde_json::Value>);

impl HostSettings {
    /// Create empty settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a setting, builder style
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Set a setting
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Get a setting
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    /// Remove a setting
    pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        self.0.remove(key)
    }

    /// Settings whose key starts with `prefix`, with the prefix stripped
    pub fn prefixed<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a serde_json::Value)> + 'a {
        self.0
            .iter()
            .filter_map(move |(key, value)| key.strip_prefix(prefix).map(|rest| (rest, value)))
            .filter(|(rest, _)| !rest.is_empty())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse settings from a TOML document with top-level keys.
    ///
    /// ```
    /// use cuttle_pool::HostSettings;
    ///
    /// let settings = HostSettings::from_toml_str(r#"
    ///     CUTTLEPOOL_HOST = "db.internal"
    ///     CUTTLEPOOL_CAPACITY = 4
    /// "#).unwrap();
    /// assert_eq!(settings.get("CUTTLEPOOL_CAPACITY"), Some(&serde_json::json!(4)));
    /// ```
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let table: toml::Table = toml::from_str(source)
            .map_err(|e| CuttleError::Configuration(format!("invalid settings: {}", e)))?;

        let mut settings = Self::new();
        for (key, value) in table {
            settings.0.insert(key, serde_json::to_value(value)?);
        }
        Ok(settings)
    }
}

impl<K, V> FromIterator<(K, V)> for HostSettings
where
    K: Into<String>,
    V: Into<serde_json::Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
