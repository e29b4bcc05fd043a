//! Connection pool configuration.
//!
//! `PoolConfig` holds every setting the pooling engine is built from. It can be
//! populated from pool-native property names (the keys users write after the
//! `hikaricp.` prefix) and then adjusted through setters.

use crate::error::PropertyError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_MAXIMUM_POOL_SIZE: u32 = 10;
pub const DEFAULT_CONNECTION_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 600_000;
pub const DEFAULT_MAX_LIFETIME_MS: u64 = 1_800_000;

/// Lowest connection timeout the pool accepts; smaller values fall back to the default.
pub const MIN_CONNECTION_TIMEOUT_MS: u64 = 250;
/// Acquire timeout used when `connectionTimeout` is 0, meaning wait indefinitely.
pub const UNBOUNDED_CONNECTION_TIMEOUT_MS: u64 = i32::MAX as u64;
/// Lowest non-zero idle timeout the pool accepts.
pub const MIN_IDLE_TIMEOUT_MS: u64 = 10_000;
/// Lowest non-zero max lifetime the pool accepts; smaller values fall back to the default.
pub const MIN_LIFETIME_MS: u64 = 30_000;

/// Property names under this prefix are forwarded to the database driver.
pub const DATA_SOURCE_PREFIX: &str = "dataSource.";

#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolConfig {
    jdbc_url: Option<String>,
    username: Option<String>,
    #[serde(skip)]
    password: Option<String>,
    maximum_pool_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    minimum_idle: Option<u32>,
    connection_timeout: u64,
    idle_timeout: u64,
    max_lifetime: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    connection_init_sql: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pool_name: Option<String>,
    test_before_acquire: bool,
    data_source_properties: BTreeMap<String, String>,
    #[serde(skip)]
    metric_registry: Option<prometheus::Registry>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            jdbc_url: None,
            username: None,
            password: None,
            maximum_pool_size: DEFAULT_MAXIMUM_POOL_SIZE,
            minimum_idle: None,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT_MS,
            idle_timeout: DEFAULT_IDLE_TIMEOUT_MS,
            max_lifetime: DEFAULT_MAX_LIFETIME_MS,
            connection_init_sql: None,
            pool_name: None,
            test_before_acquire: true,
            data_source_properties: BTreeMap::new(),
            metric_registry: None,
        }
    }
}

impl std::fmt::Debug for PoolConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolConfig")
            .field("jdbc_url", &self.jdbc_url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "****"))
            .field("maximum_pool_size", &self.maximum_pool_size)
            .field("minimum_idle", &self.minimum_idle)
            .field("connection_timeout", &self.connection_timeout)
            .field("idle_timeout", &self.idle_timeout)
            .field("max_lifetime", &self.max_lifetime)
            .field("connection_init_sql", &self.connection_init_sql)
            .field("pool_name", &self.pool_name)
            .field("test_before_acquire", &self.test_before_acquire)
            .field("data_source_properties", &self.data_source_properties)
            .field("has_metric_registry", &self.metric_registry.is_some())
            .finish()
    }
}

fn parse_value<T: std::str::FromStr>(
    key: &str,
    value: &str,
    expected: &'static str,
) -> Result<T, PropertyError> {
    value
        .trim()
        .parse()
        .map_err(|_| PropertyError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            expected,
        })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, PropertyError> {
    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if trimmed.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(PropertyError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            expected: "true or false",
        })
    }
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a configuration from pool-native property names.
    ///
    /// Every key must name a known property or start with `dataSource.`; the
    /// first unknown key or unparseable value aborts construction.
    pub fn from_properties(properties: &BTreeMap<String, String>) -> Result<Self, PropertyError> {
        let mut config = Self::default();
        for (key, value) in properties {
            config.apply_property(key, value)?;
        }
        Ok(config)
    }

    fn apply_property(&mut self, key: &str, value: &str) -> Result<(), PropertyError> {
        if let Some(name) = key.strip_prefix(DATA_SOURCE_PREFIX) {
            self.add_data_source_property(name, value);
            return Ok(());
        }

        match key {
            "jdbcUrl" => self.jdbc_url = Some(value.to_string()),
            "username" => self.username = Some(value.to_string()),
            "password" => self.password = Some(value.to_string()),
            "maximumPoolSize" => {
                self.maximum_pool_size = parse_value(key, value, "a non-negative integer")?
            }
            "minimumIdle" => {
                self.minimum_idle = Some(parse_value(key, value, "a non-negative integer")?)
            }
            "connectionTimeout" => {
                self.connection_timeout = parse_value(key, value, "milliseconds")?
            }
            "idleTimeout" => self.idle_timeout = parse_value(key, value, "milliseconds")?,
            "maxLifetime" => self.max_lifetime = parse_value(key, value, "milliseconds")?,
            "connectionInitSql" => self.connection_init_sql = Some(value.to_string()),
            "poolName" => self.pool_name = Some(value.to_string()),
            "testBeforeAcquire" => self.test_before_acquire = parse_bool(key, value)?,
            _ => {
                return Err(PropertyError::Unknown {
                    key: key.to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn jdbc_url(&self) -> Option<&str> {
        self.jdbc_url.as_deref()
    }

    pub fn set_jdbc_url(&mut self, url: impl Into<String>) {
        self.jdbc_url = Some(url.into());
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn set_username(&mut self, username: impl Into<String>) {
        self.username = Some(username.into());
    }

    /// Contains sensitive data - never log
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn set_password(&mut self, password: impl Into<String>) {
        self.password = Some(password.into());
    }

    pub fn maximum_pool_size(&self) -> u32 {
        self.maximum_pool_size
    }

    pub fn set_maximum_pool_size(&mut self, size: u32) {
        self.maximum_pool_size = size;
    }

    pub fn minimum_idle(&self) -> Option<u32> {
        self.minimum_idle
    }

    pub fn set_minimum_idle(&mut self, minimum_idle: u32) {
        self.minimum_idle = Some(minimum_idle);
    }

    /// Connection timeout in milliseconds.
    pub fn connection_timeout(&self) -> u64 {
        self.connection_timeout
    }

    pub fn set_connection_timeout(&mut self, timeout_ms: u64) {
        self.connection_timeout = timeout_ms;
    }

    /// Idle timeout in milliseconds, 0 when idle connections are never retired.
    pub fn idle_timeout(&self) -> u64 {
        self.idle_timeout
    }

    pub fn set_idle_timeout(&mut self, timeout_ms: u64) {
        self.idle_timeout = timeout_ms;
    }

    /// Max lifetime in milliseconds, 0 for unlimited.
    pub fn max_lifetime(&self) -> u64 {
        self.max_lifetime
    }

    pub fn set_max_lifetime(&mut self, lifetime_ms: u64) {
        self.max_lifetime = lifetime_ms;
    }

    /// SQL executed on every new connection before it enters the pool.
    pub fn connection_init_sql(&self) -> Option<&str> {
        self.connection_init_sql.as_deref()
    }

    pub fn set_connection_init_sql(&mut self, sql: impl Into<String>) {
        self.connection_init_sql = Some(sql.into());
    }

    pub fn pool_name(&self) -> Option<&str> {
        self.pool_name.as_deref()
    }

    pub fn set_pool_name(&mut self, name: impl Into<String>) {
        self.pool_name = Some(name.into());
    }

    pub fn test_before_acquire(&self) -> bool {
        self.test_before_acquire
    }

    pub fn set_test_before_acquire(&mut self, test: bool) {
        self.test_before_acquire = test;
    }

    pub fn data_source_properties(&self) -> &BTreeMap<String, String> {
        &self.data_source_properties
    }

    pub fn data_source_property(&self, key: &str) -> Option<&str> {
        self.data_source_properties.get(key).map(String::as_str)
    }

    /// Add a driver-level property. Replaces any previous value for `key`.
    pub fn add_data_source_property(&mut self, key: impl Into<String>, value: impl ToString) {
        self.data_source_properties
            .insert(key.into(), value.to_string());
    }

    pub fn metric_registry(&self) -> Option<&prometheus::Registry> {
        self.metric_registry.as_ref()
    }

    pub fn set_metric_registry(&mut self, registry: prometheus::Registry) {
        self.metric_registry = Some(registry);
    }

    pub fn connection_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.connection_timeout)
    }

    /// `None` when idle connections are kept forever.
    pub fn idle_timeout_duration(&self) -> Option<Duration> {
        (self.idle_timeout > 0).then(|| Duration::from_millis(self.idle_timeout))
    }

    /// `None` when connections live forever.
    pub fn max_lifetime_duration(&self) -> Option<Duration> {
        (self.max_lifetime > 0).then(|| Duration::from_millis(self.max_lifetime))
    }

    /// Clamp out-of-range settings to values the pool can run with.
    ///
    /// Mirrors the pool's own start-up validation: bad values are corrected and
    /// reported rather than rejected.
    ///
    /// A `connection_timeout` of 0 means no timeout and becomes
    /// [`UNBOUNDED_CONNECTION_TIMEOUT_MS`]; any other value below
    /// [`MIN_CONNECTION_TIMEOUT_MS`] falls back to the 30000 ms default.
    pub fn normalize(&mut self) {
        if self.maximum_pool_size < 1 {
            warn!(
                maximum_pool_size = self.maximum_pool_size,
                default = DEFAULT_MAXIMUM_POOL_SIZE,
                "maximumPoolSize less than 1, using default"
            );
            self.maximum_pool_size = DEFAULT_MAXIMUM_POOL_SIZE;
        }

        if let Some(min) = self.minimum_idle {
            if min > self.maximum_pool_size {
                warn!(
                    minimum_idle = min,
                    maximum_pool_size = self.maximum_pool_size,
                    "minimumIdle exceeds maximumPoolSize, capping"
                );
                self.minimum_idle = Some(self.maximum_pool_size);
            }
        }

        if self.connection_timeout == 0 {
            self.connection_timeout = UNBOUNDED_CONNECTION_TIMEOUT_MS;
        } else if self.connection_timeout < MIN_CONNECTION_TIMEOUT_MS {
            warn!(
                connection_timeout = self.connection_timeout,
                default = DEFAULT_CONNECTION_TIMEOUT_MS,
                "connectionTimeout is less than {}ms, using default",
                MIN_CONNECTION_TIMEOUT_MS
            );
            self.connection_timeout = DEFAULT_CONNECTION_TIMEOUT_MS;
        }

        if self.max_lifetime != 0 && self.max_lifetime < MIN_LIFETIME_MS {
            warn!(
                max_lifetime = self.max_lifetime,
                default = DEFAULT_MAX_LIFETIME_MS,
                "maxLifetime is less than {}ms, using default",
                MIN_LIFETIME_MS
            );
            self.max_lifetime = DEFAULT_MAX_LIFETIME_MS;
        }

        if self.idle_timeout != 0 && self.idle_timeout < MIN_IDLE_TIMEOUT_MS {
            warn!(
                idle_timeout = self.idle_timeout,
                minimum = MIN_IDLE_TIMEOUT_MS,
                "idleTimeout is less than {}ms, raising",
                MIN_IDLE_TIMEOUT_MS
            );
            self.idle_timeout = MIN_IDLE_TIMEOUT_MS;
        }

        if self.max_lifetime != 0 && self.idle_timeout.saturating_add(1000) > self.max_lifetime {
            warn!(
                idle_timeout = self.idle_timeout,
                max_lifetime = self.max_lifetime,
                "idleTimeout is close to or more than maxLifetime, disabling it"
            );
            self.idle_timeout = 0;
        }
    }
}
