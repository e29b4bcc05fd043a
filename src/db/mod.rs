//! Pooled database access for the metastore.
//!
//! This module provides:
//! - Data source providers that translate configuration into pools
//! - The live pool handle and its connections
//! - Pool metrics

pub mod metrics;
pub mod pool;
pub mod provider;

pub use metrics::PoolMetrics;
pub use pool::{DataSource, DbPool, PooledConnection};
pub use provider::{DataSourceProvider, HikariProvider, provider_for};
