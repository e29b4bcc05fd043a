//! Configuration handling for the metastore data source.
//!
//! This module provides the key/value configuration store the pool factory reads
//! from, and the CLI arguments of the `metastore-datasource` binary.

use crate::error::{DbError, DbResult};
use clap::Parser;
use std::collections::BTreeMap;
use std::path::Path;

/// JDBC URL of the metastore database.
pub const CONNECT_URL_KEY: &str = "javax.jdo.option.ConnectionURL";
/// User name used to connect to the metastore database.
pub const CONNECTION_USER_NAME: &str = "javax.jdo.option.ConnectionUserName";
/// Password used to connect to the metastore database.
pub const CONNECTION_PASSWORD: &str = "javax.jdo.option.ConnectionPassword";
/// Maximum number of connections in the pool.
pub const CONNECTION_POOLING_MAX_CONNECTIONS: &str = "datanucleus.connectionPool.maxPoolSize";
/// Which pooling implementation to use ("HikariCP" or "None").
pub const CONNECTION_POOLING_TYPE: &str = "datanucleus.connectionPoolingType";

pub const DEFAULT_MAX_POOL_SIZE: i32 = 10;
pub const DEFAULT_POOLING_TYPE: &str = "HikariCP";

/// Pooling type named by `conf`, trimmed, defaulting to HikariCP.
pub fn configured_pooling_type(conf: &dyn ConfigSource) -> &str {
    conf.get(CONNECTION_POOLING_TYPE)
        .map(str::trim)
        .unwrap_or(DEFAULT_POOLING_TYPE)
}

/// Typed key lookup over a configuration store.
///
/// Only `get` and `keys` are required; the typed getters are derived from them.
pub trait ConfigSource {
    /// Raw value for `key`.
    fn get(&self, key: &str) -> Option<&str>;

    /// All keys present in the store.
    fn keys(&self) -> Box<dyn Iterator<Item = &str> + '_>;

    fn get_string(&self, key: &str) -> Option<String> {
        self.get(key).map(str::to_string)
    }

    /// Integer value for `key`, or `default` when absent. Present but unparseable
    /// values are an error.
    fn get_int(&self, key: &str, default: i32) -> DbResult<i32> {
        match self.get(key) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| DbError::invalid_property(key, raw)),
            None => Ok(default),
        }
    }

    /// Long value for `key`, or `default` when absent.
    fn get_long(&self, key: &str, default: i64) -> DbResult<i64> {
        match self.get(key) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| DbError::invalid_property(key, raw)),
            None => Ok(default),
        }
    }

    /// Every entry whose key starts with `prefix`, keys unchanged.
    fn prefixed_properties(&self, prefix: &str) -> BTreeMap<String, String> {
        self.keys()
            .filter(|key| key.starts_with(prefix))
            .filter_map(|key| self.get(key).map(|value| (key.to_string(), value.to_string())))
            .collect()
    }
}

/// In-memory metastore configuration.
///
/// Later writes override earlier ones, so sources should be loaded from the most
/// general to the most specific.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetastoreConf {
    entries: BTreeMap<String, String>,
}

impl MetastoreConf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    pub fn unset(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse a single `key=value` argument.
    pub fn set_pair(&mut self, pair: &str) -> DbResult<&mut Self> {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| DbError::invalid_property(pair, ""))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(DbError::invalid_property(pair, value));
        }
        Ok(self.set(key, value.trim()))
    }

    /// Load entries from properties text.
    ///
    /// Supports `#` and `!` comment lines and both `=` and `:` separators. A line
    /// with only a key sets it to the empty string.
    pub fn load_properties(&mut self, text: &str) -> &mut Self {
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            let (key, value) = match line.find(['=', ':']) {
                Some(idx) => (&line[..idx], &line[idx + 1..]),
                None => (line, ""),
            };
            let key = key.trim();
            if !key.is_empty() {
                self.entries.insert(key.to_string(), value.trim().to_string());
            }
        }
        self
    }

    /// Load entries from a properties file on disk.
    pub fn load_properties_file(&mut self, path: impl AsRef<Path>) -> DbResult<&mut Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            DbError::internal(format!(
                "Failed to read configuration file {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(self.load_properties(&text))
    }

    /// Configured pooling type, defaulting to HikariCP.
    pub fn pooling_type(&self) -> &str {
        configured_pooling_type(self)
    }
}

impl ConfigSource for MetastoreConf {
    fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    fn keys(&self) -> Box<dyn Iterator<Item = &str> + '_> {
        Box::new(self.entries.keys().map(String::as_str))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MetastoreConf {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Configuration for the `metastore-datasource` binary.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "metastore-datasource",
    about = "Build the metastore connection pool from configuration and report the resolved settings",
    version,
    author
)]
pub struct Config {
    /// Properties files to load, in order. Later files override earlier ones.
    #[arg(
        short = 'f',
        long = "conf-file",
        value_name = "PATH",
        env = "METASTORE_CONF_FILES",
        value_delimiter = ','
    )]
    pub conf_files: Vec<String>,

    /// Individual configuration entries in "key=value" form.
    /// Applied after all files.
    #[arg(short = 'c', long = "conf", value_name = "KEY=VALUE")]
    pub conf: Vec<String>,

    /// Open one connection from the pool to verify the database is reachable
    #[arg(long, env = "METASTORE_CHECK")]
    pub check: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "METASTORE_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "METASTORE_JSON_LOGS")]
    pub json_logs: bool,

    /// Enable logging output (disabled by default so stdout carries only the report)
    #[arg(long, env = "METASTORE_ENABLE_LOGS")]
    pub enable_logs: bool,
}

impl Config {
    /// Create a default configuration (useful for testing).
    pub fn default_config() -> Self {
        Self {
            conf_files: Vec::new(),
            conf: Vec::new(),
            check: false,
            log_level: "info".to_string(),
            json_logs: false,
            enable_logs: false,
        }
    }

    /// Assemble the metastore configuration from files then explicit entries.
    pub fn load_metastore_conf(&self) -> DbResult<MetastoreConf> {
        let mut conf = MetastoreConf::new();
        for path in &self.conf_files {
            conf.load_properties_file(path)?;
        }
        for pair in &self.conf {
            conf.set_pair(pair)?;
        }
        Ok(conf)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}
