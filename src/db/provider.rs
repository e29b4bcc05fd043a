//! Data source providers.
//!
//! A provider turns the metastore configuration into a pooled [`DataSource`].
//! Pool-specific options live under a namespace prefix (`hikaricp.`) and are
//! forwarded to the pool configuration with the prefix removed; the connection
//! URL, credentials, pool size and connection timeout always come from their
//! dedicated keys and override anything set through the prefix.

use crate::config::{
    CONNECT_URL_KEY, CONNECTION_PASSWORD, CONNECTION_POOLING_MAX_CONNECTIONS,
    CONNECTION_USER_NAME, ConfigSource, DEFAULT_MAX_POOL_SIZE, configured_pooling_type,
};
use crate::db::pool::DataSource;
use crate::error::{DbError, DbResult};
use crate::models::pool_config::DEFAULT_CONNECTION_TIMEOUT_MS;
use crate::models::{DbType, PoolConfig, determine_database_product};
use std::collections::BTreeMap;
use tracing::debug;

pub const HIKARI: &str = "hikaricp";
pub const HIKARI_PREFIX: &str = "hikaricp.";
pub const CONNECTION_TIMEOUT_PROPERTY: &str = "hikaricp.connectionTimeout";

/// Session mode applied to every MySQL connection so identifiers can be double-quoted.
pub const MYSQL_ANSI_QUOTES_INIT_SQL: &str = "SET @@session.sql_mode=ANSI_QUOTES";

/// Builds pooled data sources from metastore configuration.
pub trait DataSourceProvider: Send + Sync {
    /// Create a data source for the metastore database.
    fn create(&self, conf: &dyn ConfigSource) -> DbResult<DataSource>;

    /// Name of the pooling implementation, as used for the option prefix.
    fn pooling_type(&self) -> &'static str;

    /// Whether this provider is the one selected by `conf`.
    fn supports(&self, conf: &dyn ConfigSource) -> bool {
        configured_pooling_type(conf).eq_ignore_ascii_case(self.pooling_type())
    }

    /// Whether a borrowed connection may already be closed. Pools that validate
    /// connections on checkout never hand out a closed one.
    fn may_return_closed_connection(&self) -> bool {
        false
    }
}

/// Select the provider for the configured pooling type, reporting pool metrics
/// into `metric_registry` when one is given.
///
/// Returns `None` when pooling is disabled or the type is unknown.
pub fn provider_for(
    conf: &dyn ConfigSource,
    metric_registry: Option<prometheus::Registry>,
) -> Option<Box<dyn DataSourceProvider>> {
    let providers: [Box<dyn DataSourceProvider>; 1] =
        [Box::new(HikariProvider::new().with_optional_metric_registry(metric_registry))];
    let selected = providers.into_iter().find(|p| p.supports(conf));
    if selected.is_none() {
        debug!(
            pooling_type = %configured_pooling_type(conf),
            "No data source provider for pooling type"
        );
    }
    selected
}

/// Provider for the HikariCP-style pool.
///
/// The metric registry is injected rather than looked up globally; when one is
/// set, the pool registers its counters and gauges into it.
#[derive(Clone, Default)]
pub struct HikariProvider {
    metric_registry: Option<prometheus::Registry>,
}

impl std::fmt::Debug for HikariProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HikariProvider")
            .field("has_metric_registry", &self.metric_registry.is_some())
            .finish()
    }
}

impl HikariProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report pool metrics into `registry`.
    pub fn with_metric_registry(mut self, registry: prometheus::Registry) -> Self {
        self.metric_registry = Some(registry);
        self
    }

    /// Report pool metrics into `registry` when one is available.
    pub fn with_optional_metric_registry(mut self, registry: Option<prometheus::Registry>) -> Self {
        self.metric_registry = registry;
        self
    }

    /// Translate the metastore configuration into a finished pool configuration
    /// without creating the pool.
    pub fn configure(&self, conf: &dyn ConfigSource) -> DbResult<PoolConfig> {
        debug!("Creating Hikari connection pool for the MetaStore");

        let driver_url = required(conf, CONNECT_URL_KEY)?;
        let user = required(conf, CONNECTION_USER_NAME)?;
        let password = required(conf, CONNECTION_PASSWORD)?;

        let max_pool_size = conf.get_int(CONNECTION_POOLING_MAX_CONNECTIONS, DEFAULT_MAX_POOL_SIZE)?;
        let max_pool_size = u32::try_from(max_pool_size).map_err(|_| {
            DbError::invalid_property(CONNECTION_POOLING_MAX_CONNECTIONS, max_pool_size.to_string())
        })?;

        let properties = replace_prefix(conf.prefixed_properties(HIKARI_PREFIX));
        let connection_timeout =
            conf.get_long(CONNECTION_TIMEOUT_PROPERTY, DEFAULT_CONNECTION_TIMEOUT_MS as i64)?;
        let connection_timeout = u64::try_from(connection_timeout).map_err(|_| {
            DbError::invalid_property(CONNECTION_TIMEOUT_PROPERTY, connection_timeout.to_string())
        })?;

        let mut config = PoolConfig::from_properties(&properties)
            .map_err(|e| DbError::configuration(HIKARI, e))?;
        config.set_maximum_pool_size(max_pool_size);
        config.set_jdbc_url(driver_url.as_str());
        config.set_username(user);
        config.set_password(password);
        config.set_connection_timeout(connection_timeout);

        apply_vendor_settings(&mut config, determine_database_product(&driver_url, None));

        if let Some(registry) = &self.metric_registry {
            config.set_metric_registry(registry.clone());
        }
        Ok(config)
    }
}

impl DataSourceProvider for HikariProvider {
    fn create(&self, conf: &dyn ConfigSource) -> DbResult<DataSource> {
        DataSource::new(self.configure(conf)?)
    }

    fn pooling_type(&self) -> &'static str {
        HIKARI
    }
}

fn required(conf: &dyn ConfigSource, key: &str) -> DbResult<String> {
    conf.get_string(key)
        .ok_or_else(|| DbError::missing_property(key))
}

/// Strip the pool namespace from every key.
fn replace_prefix(properties: BTreeMap<String, String>) -> BTreeMap<String, String> {
    properties
        .into_iter()
        .map(|(key, value)| match key.strip_prefix(HIKARI_PREFIX) {
            Some(stripped) => (stripped.to_string(), value),
            None => (key, value),
        })
        .collect()
}

/// Session and driver settings tuned per database product.
fn apply_vendor_settings(config: &mut PoolConfig, db_type: DbType) {
    match db_type {
        DbType::MySql => {
            config.set_connection_init_sql(MYSQL_ANSI_QUOTES_INIT_SQL);
            config.add_data_source_property("allowMultiQueries", true);
            config.add_data_source_property("rewriteBatchedStatements", true);
        }
        DbType::Postgres => {
            config.add_data_source_property("reWriteBatchedInserts", true);
        }
        _ => {}
    }
}
