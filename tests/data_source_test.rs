//! Tests for live data sources built by the provider.
//!
//! SQLite pools are exercised end to end; MySQL and PostgreSQL pools are created
//! lazily and never connect, so they need no running server.

use metastore_datasource::config::{
    CONNECT_URL_KEY, CONNECTION_PASSWORD, CONNECTION_POOLING_MAX_CONNECTIONS,
    CONNECTION_POOLING_TYPE, CONNECTION_USER_NAME, MetastoreConf,
};
use metastore_datasource::db::provider::CONNECTION_TIMEOUT_PROPERTY;
use metastore_datasource::db::{DataSourceProvider, HikariProvider, PooledConnection, provider_for};
use metastore_datasource::error::DbError;
use metastore_datasource::models::DbType;
use metastore_datasource::models::pool_config::UNBOUNDED_CONNECTION_TIMEOUT_MS;
use prometheus::Registry;

fn conf_for(url: &str) -> MetastoreConf {
    let mut conf = MetastoreConf::new();
    conf.set(CONNECT_URL_KEY, url)
        .set(CONNECTION_USER_NAME, "hive")
        .set(CONNECTION_PASSWORD, "hivepw");
    conf
}

fn sqlite_conf() -> MetastoreConf {
    conf_for("jdbc:sqlite::memory:")
}

#[tokio::test]
async fn test_sqlite_pool_acquires_connection() {
    let data_source = HikariProvider::new().create(&sqlite_conf()).unwrap();
    assert_eq!(data_source.db_type(), DbType::Sqlite);
    assert_eq!(data_source.size(), 0, "pool is created lazily");

    let mut conn = data_source.acquire().await.unwrap();
    conn.ping().await.unwrap();
    let version = conn.server_version().await.unwrap();
    assert!(version.starts_with('3'), "unexpected SQLite version {version}");
    assert_eq!(data_source.size(), 1);

    drop(conn);
    data_source.close().await;
    assert!(data_source.is_closed());
}

#[tokio::test]
async fn test_connection_init_sql_runs_on_new_connections() {
    let mut conf = sqlite_conf();
    conf.set("hikaricp.connectionInitSql", "PRAGMA foreign_keys = ON");
    let data_source = HikariProvider::new().create(&conf).unwrap();

    let PooledConnection::Sqlite(mut conn) = data_source.acquire().await.unwrap() else {
        panic!("Expected SQLite connection");
    };
    let enabled: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
        .fetch_one(&mut *conn)
        .await
        .unwrap();
    assert_eq!(enabled, 1);

    drop(conn);
    data_source.close().await;
}

#[tokio::test]
async fn test_acquire_times_out_when_pool_exhausted() {
    let mut conf = sqlite_conf();
    conf.set(CONNECTION_POOLING_MAX_CONNECTIONS, "1")
        .set(CONNECTION_TIMEOUT_PROPERTY, "250");
    let registry = Registry::new();
    let data_source = HikariProvider::new()
        .with_metric_registry(registry)
        .create(&conf)
        .unwrap();

    let held = data_source.acquire().await.unwrap();
    let err = data_source.acquire().await.unwrap_err();
    assert!(matches!(err, DbError::Timeout { elapsed_ms: 250, .. }));
    assert!(err.is_retryable());

    let metrics = data_source.metrics().expect("metrics enabled");
    assert_eq!(metrics.requested.get(), 2);
    assert_eq!(metrics.acquired.get(), 1);
    assert_eq!(metrics.unacquired_error.get(), 1);

    drop(held);
    data_source.close().await;
}

#[tokio::test]
async fn test_huge_idle_timeout_is_disabled() {
    let mut conf = sqlite_conf();
    conf.set("hikaricp.idleTimeout", "18446744073709551615");
    let data_source = HikariProvider::new().create(&conf).unwrap();

    assert_eq!(data_source.config().idle_timeout(), 0);
    let conn = data_source.acquire().await.unwrap();
    drop(conn);
    data_source.close().await;
}

#[tokio::test]
async fn test_zero_connection_timeout_waits_indefinitely() {
    let mut conf = sqlite_conf();
    conf.set(CONNECTION_TIMEOUT_PROPERTY, "0");
    let data_source = HikariProvider::new().create(&conf).unwrap();

    assert_eq!(
        data_source.config().connection_timeout(),
        UNBOUNDED_CONNECTION_TIMEOUT_MS
    );
    let conn = data_source.acquire().await.unwrap();
    drop(conn);
    data_source.close().await;
}

#[tokio::test]
async fn test_metrics_reported_into_injected_registry() {
    let registry = Registry::new();
    let mut conf = sqlite_conf();
    conf.set("hikaricp.poolName", "metastore");
    let data_source = HikariProvider::new()
        .with_metric_registry(registry.clone())
        .create(&conf)
        .unwrap();

    let conn = data_source.acquire().await.unwrap();
    data_source.refresh_metrics();

    let families = registry.gather();
    let value = |name: &str| {
        families
            .iter()
            .find(|family| family.get_name() == name)
            .map(|family| {
                let metric = &family.get_metric()[0];
                if metric.has_counter() {
                    metric.get_counter().get_value()
                } else {
                    metric.get_gauge().get_value()
                }
            })
            .unwrap_or_else(|| panic!("metric {name} not registered"))
    };

    assert_eq!(value("metastore_connections_acquired"), 1.0);
    assert_eq!(value("metastore_connections_created"), 1.0);
    assert_eq!(value("metastore_connections_total"), 1.0);
    assert_eq!(value("metastore_connections_active"), 1.0);
    assert_eq!(value("metastore_connections_max"), 10.0);

    drop(conn);
    data_source.close().await;
}

#[tokio::test]
async fn test_provider_lookup_carries_registry() {
    let registry = Registry::new();
    let conf = sqlite_conf();
    let provider = provider_for(&conf, Some(registry.clone())).expect("HikariCP is the default");
    let data_source = provider.create(&conf).unwrap();

    assert!(data_source.config().metric_registry().is_some());
    let conn = data_source.acquire().await.unwrap();
    drop(conn);
    assert!(
        registry
            .gather()
            .iter()
            .any(|family| family.get_name() == "hikaricp_connections_acquired")
    );
    data_source.close().await;
}

#[test]
fn test_provider_lookup_rejects_disabled_pooling() {
    let mut conf = sqlite_conf();
    conf.set(CONNECTION_POOLING_TYPE, "None");
    assert!(provider_for(&conf, Some(Registry::new())).is_none());
}

#[tokio::test]
async fn test_no_metrics_without_registry() {
    let data_source = HikariProvider::new().create(&sqlite_conf()).unwrap();
    assert!(data_source.metrics().is_none());
    assert!(data_source.config().metric_registry().is_none());
    data_source.close().await;
}

#[tokio::test]
async fn test_mysql_pool_created_lazily() {
    let data_source = HikariProvider::new()
        .create(&conf_for("jdbc:mysql://127.0.0.1:1/metastore"))
        .unwrap();
    assert_eq!(data_source.db_type(), DbType::MySql);
    assert_eq!(data_source.size(), 0);
    assert_eq!(
        data_source.config().data_source_property("allowMultiQueries"),
        Some("true")
    );
    data_source.close().await;
}

#[tokio::test]
async fn test_postgres_pool_created_lazily() {
    let data_source = HikariProvider::new()
        .create(&conf_for("jdbc:postgresql://127.0.0.1:1/metastore"))
        .unwrap();
    assert_eq!(data_source.db_type(), DbType::Postgres);
    assert_eq!(data_source.size(), 0);
    data_source.close().await;
}

#[tokio::test]
async fn test_unreachable_server_fails_on_acquire() {
    let mut conf = conf_for("jdbc:postgresql://127.0.0.1:1/metastore");
    conf.set(CONNECTION_TIMEOUT_PROPERTY, "1000");
    let data_source = HikariProvider::new().create(&conf).unwrap();

    let err = data_source.acquire().await.unwrap_err();
    assert!(err.is_retryable(), "unexpected error: {err:?}");
    data_source.close().await;
}

#[tokio::test]
async fn test_derby_is_unsupported() {
    let err = HikariProvider::new()
        .create(&conf_for("jdbc:derby:;databaseName=metastore_db;create=true"))
        .unwrap_err();
    assert!(matches!(err, DbError::UnsupportedDatabase { .. }));
}

#[tokio::test]
async fn test_duplicate_pool_name_fails_metric_registration() {
    let registry = Registry::new();
    let provider = HikariProvider::new().with_metric_registry(registry);
    let conf = sqlite_conf();

    let first = provider.create(&conf).unwrap();
    let err = provider.create(&conf).unwrap_err();
    assert!(matches!(err, DbError::Metrics { .. }));
    first.close().await;
}
