//! Metastore data source - command line entry point.
//!
//! Builds the metastore connection pool from configuration files and
//! `key=value` overrides, prints the resolved pool settings as JSON, and can
//! optionally open a connection to verify the database is reachable.

use clap::Parser;
use metastore_datasource::config::Config;
use metastore_datasource::db::provider_for;
use metastore_datasource::error::{DbError, DbResult};
use metastore_datasource::models::DbType;
use prometheus::{Encoder, Registry, TextEncoder};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse();

    if config.enable_logs {
        init_tracing(&config);
    }

    let conf = config.load_metastore_conf()?;

    info!(
        entries = conf.len(),
        pooling_type = %conf.pooling_type(),
        "Starting metastore data source v{}",
        env!("CARGO_PKG_VERSION")
    );

    let registry = Registry::new();
    let provider = provider_for(&conf, Some(registry.clone()))
        .ok_or_else(|| DbError::unsupported_pooling_type(conf.pooling_type()))
        .inspect_err(|e| {
            if let Some(suggestion) = e.suggestion() {
                eprintln!("Suggestion: {}", suggestion);
            }
        })?;

    let data_source = provider.create(&conf)?;

    let mut server_version = None;
    if config.check {
        info!(db_type = %data_source.db_type(), "Checking database connectivity");
        let result: DbResult<String> = async {
            let mut conn = data_source.acquire().await?;
            conn.ping().await?;
            conn.server_version().await
        }
        .await;

        match result {
            Ok(version) => server_version = Some(version),
            Err(e) => {
                error!(error = %e, "Connectivity check failed");
                if let Some(suggestion) = e.suggestion() {
                    eprintln!("Suggestion: {}", suggestion);
                }
                data_source.close().await;
                return Err(e.into());
            }
        }
    }

    let db_type: DbType = data_source.db_type();
    let report = serde_json::json!({
        "poolingType": provider.pooling_type(),
        "dbType": db_type,
        "serverVersion": server_version,
        "pool": data_source.config(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    if config.check {
        data_source.refresh_metrics();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
        print!("{}", String::from_utf8(buffer)?);
    }

    data_source.close().await;
    info!("Shutdown complete");
    Ok(())
}
