//! Live connection pool handle.
//!
//! This module turns a finished [`PoolConfig`] into a database-specific pool
//! (MySqlPool, PgPool, SqlitePool). Pools are created lazily: no connection is
//! opened until the first acquire, so unreachable servers and bad credentials
//! surface there rather than at start-up.

use crate::db::metrics::PoolMetrics;
use crate::error::{DbError, DbResult};
use crate::models::{DbType, PoolConfig};
use sqlx::mysql::{MySql, MySqlConnectOptions, MySqlPoolOptions, MySqlSslMode};
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode, Postgres};
use sqlx::sqlite::{Sqlite, SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Connection, MySqlPool, PgPool, SqlitePool};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// Data source properties the MySQL driver understands.
const MYSQL_DRIVER_PROPERTIES: &[&str] = &["characterEncoding", "sslMode"];
/// Data source properties the PostgreSQL driver understands.
const POSTGRES_DRIVER_PROPERTIES: &[&str] = &["ApplicationName", "sslmode"];

/// Database-specific connection pool (avoids AnyPool limitations).
#[derive(Debug, Clone)]
pub enum DbPool {
    MySql(MySqlPool),
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

impl DbPool {
    /// Close the connection pool.
    pub async fn close(&self) {
        match self {
            DbPool::MySql(pool) => pool.close().await,
            DbPool::Postgres(pool) => pool.close().await,
            DbPool::Sqlite(pool) => pool.close().await,
        }
    }

    pub fn is_closed(&self) -> bool {
        match self {
            DbPool::MySql(pool) => pool.is_closed(),
            DbPool::Postgres(pool) => pool.is_closed(),
            DbPool::Sqlite(pool) => pool.is_closed(),
        }
    }

    /// Connections currently held by the pool, idle or in use.
    pub fn size(&self) -> u32 {
        match self {
            DbPool::MySql(pool) => pool.size(),
            DbPool::Postgres(pool) => pool.size(),
            DbPool::Sqlite(pool) => pool.size(),
        }
    }

    pub fn num_idle(&self) -> usize {
        match self {
            DbPool::MySql(pool) => pool.num_idle(),
            DbPool::Postgres(pool) => pool.num_idle(),
            DbPool::Sqlite(pool) => pool.num_idle(),
        }
    }

    /// Get the database type for this pool.
    pub fn db_type(&self) -> DbType {
        match self {
            DbPool::MySql(_) => DbType::MySql,
            DbPool::Postgres(_) => DbType::Postgres,
            DbPool::Sqlite(_) => DbType::Sqlite,
        }
    }
}

/// A connection checked out of a [`DataSource`]. Returned to the pool on drop.
pub enum PooledConnection {
    MySql(PoolConnection<MySql>),
    Postgres(PoolConnection<Postgres>),
    Sqlite(PoolConnection<Sqlite>),
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let db_type = match self {
            PooledConnection::MySql(_) => DbType::MySql,
            PooledConnection::Postgres(_) => DbType::Postgres,
            PooledConnection::Sqlite(_) => DbType::Sqlite,
        };
        f.debug_struct("PooledConnection")
            .field("db_type", &db_type)
            .finish_non_exhaustive()
    }
}

impl PooledConnection {
    /// Check the connection is still usable.
    pub async fn ping(&mut self) -> DbResult<()> {
        match self {
            PooledConnection::MySql(conn) => conn.ping().await?,
            PooledConnection::Postgres(conn) => conn.ping().await?,
            PooledConnection::Sqlite(conn) => conn.ping().await?,
        }
        Ok(())
    }

    /// Version string reported by the database server.
    pub async fn server_version(&mut self) -> DbResult<String> {
        let version = match self {
            PooledConnection::MySql(conn) => {
                sqlx::query_scalar::<_, String>("SELECT version()")
                    .fetch_one(&mut **conn)
                    .await?
            }
            PooledConnection::Postgres(conn) => {
                sqlx::query_scalar::<_, String>("SELECT version()")
                    .fetch_one(&mut **conn)
                    .await?
            }
            PooledConnection::Sqlite(conn) => {
                sqlx::query_scalar::<_, String>("SELECT sqlite_version()")
                    .fetch_one(&mut **conn)
                    .await?
            }
        };
        Ok(version)
    }
}

/// Pool options shared by every backend, including the after-connect hook that
/// runs the init SQL and counts physical connections.
macro_rules! pool_options {
    ($options:ty, $config:expr, $metrics:expr) => {{
        let init_sql = $config.connection_init_sql().map(str::to_string);
        let created = $metrics.as_ref().map(|m| m.created.clone());
        let mut options = <$options>::new()
            .max_connections($config.maximum_pool_size())
            .acquire_timeout($config.connection_timeout_duration())
            .idle_timeout($config.idle_timeout_duration())
            .max_lifetime($config.max_lifetime_duration())
            .test_before_acquire($config.test_before_acquire())
            .after_connect(move |conn, _meta| {
                let init_sql = init_sql.clone();
                let created = created.clone();
                Box::pin(async move {
                    if let Some(sql) = init_sql {
                        sqlx::Executor::execute(&mut *conn, sql.as_str()).await?;
                    }
                    if let Some(counter) = created {
                        counter.inc();
                    }
                    Ok(())
                })
            });
        if let Some(min) = $config.minimum_idle() {
            options = options.min_connections(min);
        }
        options
    }};
}

/// A pooled data source built from a finalized [`PoolConfig`].
#[derive(Debug, Clone)]
pub struct DataSource {
    pool: DbPool,
    config: PoolConfig,
    metrics: Option<Arc<PoolMetrics>>,
}

impl DataSource {
    /// Create the pool described by `config`.
    ///
    /// No connection is opened here. Must be called from within a Tokio runtime,
    /// since the pool spawns its maintenance task on creation.
    pub fn new(mut config: PoolConfig) -> DbResult<Self> {
        config.normalize();

        let jdbc_url = config
            .jdbc_url()
            .ok_or_else(|| DbError::missing_property("jdbcUrl"))?
            .to_string();
        let db_type = DbType::from_jdbc_url(&jdbc_url);
        let url = driver_url(&jdbc_url, db_type)?;

        let metrics = config
            .metric_registry()
            .map(|registry| PoolMetrics::new(config.pool_name(), registry))
            .transpose()?;

        debug!(
            db_type = %db_type,
            url = %masked_url(&url),
            max_connections = config.maximum_pool_size(),
            connection_timeout_ms = config.connection_timeout(),
            metrics = metrics.is_some(),
            "Creating connection pool"
        );

        let pool = match db_type {
            DbType::MySql => {
                let options = mysql_connect_options(&url, &config)?;
                DbPool::MySql(
                    pool_options!(MySqlPoolOptions, config, metrics).connect_lazy_with(options),
                )
            }
            DbType::Postgres => {
                let options = postgres_connect_options(&url, &config)?;
                DbPool::Postgres(
                    pool_options!(PgPoolOptions, config, metrics).connect_lazy_with(options),
                )
            }
            DbType::Sqlite => {
                let options = SqliteConnectOptions::from_str(&url).map_err(|e| {
                    DbError::connection(
                        format!("Invalid SQLite connection URL: {}", e),
                        "Check the JDBC URL format: jdbc:sqlite:path/to/metastore.db",
                    )
                })?;
                log_unused_properties(db_type, config.data_source_properties(), &[]);
                DbPool::Sqlite(
                    pool_options!(SqlitePoolOptions, config, metrics).connect_lazy_with(options),
                )
            }
            other => return Err(unsupported(other)),
        };

        let data_source = Self {
            pool,
            config,
            metrics,
        };
        data_source.refresh_metrics();

        info!(
            db_type = %db_type,
            pool_name = ?data_source.config.pool_name(),
            "Connection pool ready"
        );
        Ok(data_source)
    }

    /// Borrow a connection from the pool, waiting up to the connection timeout.
    pub async fn acquire(&self) -> DbResult<PooledConnection> {
        if let Some(metrics) = &self.metrics {
            metrics.requested.inc();
        }

        let result = match &self.pool {
            DbPool::MySql(pool) => pool.acquire().await.map(PooledConnection::MySql),
            DbPool::Postgres(pool) => pool.acquire().await.map(PooledConnection::Postgres),
            DbPool::Sqlite(pool) => pool.acquire().await.map(PooledConnection::Sqlite),
        };

        if let Some(metrics) = &self.metrics {
            match &result {
                Ok(_) => metrics.acquired.inc(),
                Err(_) => metrics.unacquired_error.inc(),
            }
        }
        self.refresh_metrics();

        result.map_err(|e| match e {
            sqlx::Error::PoolTimedOut => {
                DbError::timeout("connection pool acquire", self.config.connection_timeout())
            }
            other => {
                warn!(error = %other, "Failed to acquire connection");
                DbError::from(other)
            }
        })
    }

    /// Close the pool. Checked-out connections are closed when returned.
    pub async fn close(&self) {
        self.pool.close().await;
        self.refresh_metrics();
        info!(pool_name = ?self.config.pool_name(), "Connection pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    pub fn size(&self) -> u32 {
        self.pool.size()
    }

    pub fn num_idle(&self) -> usize {
        self.pool.num_idle()
    }

    pub fn db_type(&self) -> DbType {
        self.pool.db_type()
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// The configuration this pool was built from, after normalization.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn metrics(&self) -> Option<&PoolMetrics> {
        self.metrics.as_deref()
    }

    /// Push the current pool occupancy into the metric gauges, if metrics are enabled.
    pub fn refresh_metrics(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.observe(
                self.pool.size(),
                self.pool.num_idle(),
                self.config.maximum_pool_size(),
            );
        }
    }
}

fn unsupported(db_type: DbType) -> DbError {
    DbError::unsupported_database(
        db_type.display_name(),
        "No driver is available for this database; use MySQL, PostgreSQL or SQLite",
    )
}

/// Convert a JDBC URL into the URL form the driver parses.
///
/// `jdbc:mysql://host/db` becomes `mysql://host/db`; MariaDB URLs are routed to the
/// MySQL driver.
pub fn driver_url(jdbc_url: &str, db_type: DbType) -> DbResult<String> {
    let trimmed = jdbc_url.trim();
    let rest = trimmed
        .get(..5)
        .filter(|prefix| prefix.eq_ignore_ascii_case("jdbc:"))
        .map(|_| &trimmed[5..])
        .ok_or_else(|| {
            DbError::connection(
                "JDBC URL must start with 'jdbc:'",
                "Use a URL such as jdbc:postgresql://host:5432/metastore",
            )
        })?;
    let (_, tail) = rest.split_once(':').ok_or_else(|| {
        DbError::connection(
            "JDBC URL is missing the driver name",
            "Use a URL such as jdbc:postgresql://host:5432/metastore",
        )
    })?;

    let scheme = match db_type {
        DbType::MySql => "mysql",
        DbType::Postgres => "postgres",
        DbType::Sqlite => "sqlite",
        other => return Err(unsupported(other)),
    };
    Ok(format!("{}:{}", scheme, tail))
}

/// Driver URL with any password replaced, safe for logs.
fn masked_url(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("****"));
            }
            parsed.to_string()
        }
        Err(_) => "<unparseable>".to_string(),
    }
}

fn mysql_connect_options(url: &str, config: &PoolConfig) -> DbResult<MySqlConnectOptions> {
    let mut options = MySqlConnectOptions::from_str(url).map_err(|e| {
        DbError::connection(
            format!("Invalid MySQL connection URL: {}", e),
            "Check the JDBC URL format: jdbc:mysql://host:3306/database",
        )
    })?;

    if let Some(user) = config.username().filter(|u| !u.is_empty()) {
        options = options.username(user);
    }
    if let Some(password) = config.password().filter(|p| !p.is_empty()) {
        options = options.password(password);
    }

    let props = config.data_source_properties();
    if let Some(charset) = props.get("characterEncoding") {
        options = options.charset(charset);
    }
    if let Some(mode) = props.get("sslMode") {
        let mode = MySqlSslMode::from_str(mode).map_err(|e| {
            DbError::connection(
                format!("Invalid sslMode: {}", e),
                "Use one of DISABLED, PREFERRED, REQUIRED, VERIFY_CA, VERIFY_IDENTITY",
            )
        })?;
        options = options.ssl_mode(mode);
    }
    log_unused_properties(DbType::MySql, props, MYSQL_DRIVER_PROPERTIES);

    Ok(options)
}

fn postgres_connect_options(url: &str, config: &PoolConfig) -> DbResult<PgConnectOptions> {
    let mut options = PgConnectOptions::from_str(url).map_err(|e| {
        DbError::connection(
            format!("Invalid PostgreSQL connection URL: {}", e),
            "Check the JDBC URL format: jdbc:postgresql://host:5432/database",
        )
    })?;

    if let Some(user) = config.username().filter(|u| !u.is_empty()) {
        options = options.username(user);
    }
    if let Some(password) = config.password().filter(|p| !p.is_empty()) {
        options = options.password(password);
    }

    let props = config.data_source_properties();
    if let Some(name) = props.get("ApplicationName") {
        options = options.application_name(name);
    }
    if let Some(mode) = props.get("sslmode") {
        let mode = PgSslMode::from_str(mode).map_err(|e| {
            DbError::connection(
                format!("Invalid sslmode: {}", e),
                "Use one of disable, allow, prefer, require, verify-ca, verify-full",
            )
        })?;
        options = options.ssl_mode(mode);
    }
    log_unused_properties(DbType::Postgres, props, POSTGRES_DRIVER_PROPERTIES);

    Ok(options)
}

fn log_unused_properties(db_type: DbType, props: &BTreeMap<String, String>, used: &[&str]) {
    for (key, value) in props {
        if !used.contains(&key.as_str()) {
            debug!(
                db_type = %db_type,
                property = %key,
                value = %value,
                "Data source property has no driver equivalent, kept on configuration only"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_url_mysql() {
        assert_eq!(
            driver_url("jdbc:mysql://db:3306/metastore?useSSL=false", DbType::MySql).unwrap(),
            "mysql://db:3306/metastore?useSSL=false"
        );
        assert_eq!(
            driver_url("jdbc:mariadb://db/metastore", DbType::MySql).unwrap(),
            "mysql://db/metastore"
        );
    }

    #[test]
    fn test_driver_url_postgres_and_sqlite() {
        assert_eq!(
            driver_url("JDBC:postgresql://db:5432/metastore", DbType::Postgres).unwrap(),
            "postgres://db:5432/metastore"
        );
        assert_eq!(
            driver_url("jdbc:sqlite::memory:", DbType::Sqlite).unwrap(),
            "sqlite::memory:"
        );
    }

    #[test]
    fn test_driver_url_rejects_unsupported() {
        let err = driver_url("jdbc:derby:;databaseName=metastore_db", DbType::Derby).unwrap_err();
        assert!(matches!(err, DbError::UnsupportedDatabase { .. }));
        assert!(driver_url("mysql://db/metastore", DbType::MySql).is_err());
    }

    #[test]
    fn test_masked_url() {
        assert_eq!(
            masked_url("postgres://hive:s3cret@db:5432/ms"),
            "postgres://hive:****@db:5432/ms"
        );
        assert_eq!(masked_url("mysql://db/ms"), "mysql://db/ms");
    }

    #[test]
    fn test_mysql_options_apply_credentials() {
        let mut config = PoolConfig::new();
        config.set_username("hive");
        config.set_password("s3cret");
        config.add_data_source_property("characterEncoding", "utf8mb4");
        config.add_data_source_property("allowMultiQueries", true);
        let options = mysql_connect_options("mysql://other@db:3306/ms", &config).unwrap();
        assert_eq!(options.get_username(), "hive");
        assert_eq!(options.get_database(), Some("ms"));
    }

    #[test]
    fn test_postgres_options_apply_credentials() {
        let mut config = PoolConfig::new();
        config.set_username("hive");
        config.add_data_source_property("ApplicationName", "metastore");
        let options = postgres_connect_options("postgres://db:5432/ms", &config).unwrap();
        assert_eq!(options.get_username(), "hive");
        assert_eq!(options.get_application_name(), Some("metastore"));
    }

    #[test]
    fn test_invalid_ssl_mode_rejected() {
        let mut config = PoolConfig::new();
        config.add_data_source_property("sslmode", "sometimes");
        let err = postgres_connect_options("postgres://db/ms", &config).unwrap_err();
        assert!(err.to_string().contains("sslmode"));
    }
}
