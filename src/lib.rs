//! Metastore data source library.
//!
//! This library builds the metastore's database connection pool from generic
//! configuration: pool options are forwarded from a namespaced prefix, vendor
//! specific session and driver settings are applied, and pool metrics can be
//! reported into a Prometheus registry.

pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use config::{ConfigSource, MetastoreConf};
pub use db::{DataSource, DataSourceProvider, HikariProvider};
pub use error::DbError;
