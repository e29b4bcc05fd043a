//! Data models for the metastore data source.
//!
//! This module contains the types shared between configuration and pooling:
//! - Database product detection
//! - Pool configuration

pub mod pool_config;
pub mod product;

pub use pool_config::PoolConfig;
pub use product::{DbType, determine_database_product};
