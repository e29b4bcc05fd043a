//! Pool metrics reported into a Prometheus registry.

use crate::error::DbResult;
use prometheus::{IntCounter, IntGauge, Registry};
use prometheus::{register_int_counter_with_registry, register_int_gauge_with_registry};
use std::sync::Arc;

pub const DEFAULT_METRICS_PREFIX: &str = "hikaricp";

pub struct PoolMetrics {
    pub requested: IntCounter,
    pub acquired: IntCounter,
    pub unacquired_error: IntCounter,
    pub created: IntCounter,
    pub total_connections: IntGauge,
    pub idle_connections: IntGauge,
    pub active_connections: IntGauge,
    pub max_connections: IntGauge,
}

impl PoolMetrics {
    /// Register pool metrics under `prefix` (typically the pool name).
    pub fn new(prefix: Option<&str>, registry: &Registry) -> DbResult<Arc<Self>> {
        let prefix = metric_prefix(prefix);
        let name = |n| format!("{prefix}_{n}");
        let pool_metrics = PoolMetrics {
            requested: register_int_counter_with_registry!(
                name("connections_requested"),
                "Total requested connections from the pool",
                registry,
            )?,
            acquired: register_int_counter_with_registry!(
                name("connections_acquired"),
                "Total requested connections from the pool that were acquired",
                registry,
            )?,
            unacquired_error: register_int_counter_with_registry!(
                name("connections_unacquired_error"),
                "Total requested connections from the pool that were not acquired due to an error",
                registry,
            )?,
            created: register_int_counter_with_registry!(
                name("connections_created"),
                "Total physical connections opened by the pool",
                registry,
            )?,
            total_connections: register_int_gauge_with_registry!(
                name("connections_total"),
                "Connections currently held by the pool, idle or in use",
                registry,
            )?,
            idle_connections: register_int_gauge_with_registry!(
                name("connections_idle"),
                "Idle connections in the pool",
                registry,
            )?,
            active_connections: register_int_gauge_with_registry!(
                name("connections_active"),
                "Connections currently checked out of the pool",
                registry,
            )?,
            max_connections: register_int_gauge_with_registry!(
                name("connections_max"),
                "Configured maximum pool size",
                registry,
            )?,
        };
        Ok(Arc::new(pool_metrics))
    }

    /// Update the gauges from a pool snapshot.
    pub fn observe(&self, size: u32, idle: usize, max: u32) {
        let size = i64::from(size);
        let idle = i64::try_from(idle).unwrap_or(i64::MAX);
        self.total_connections.set(size);
        self.idle_connections.set(idle);
        self.active_connections.set((size - idle).max(0));
        self.max_connections.set(i64::from(max));
    }
}

impl std::fmt::Debug for PoolMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolMetrics")
            .field("requested", &self.requested.get())
            .field("acquired", &self.acquired.get())
            .field("unacquired_error", &self.unacquired_error.get())
            .field("created", &self.created.get())
            .finish_non_exhaustive()
    }
}

/// Metric names only allow `[a-zA-Z0-9_:]`; anything else becomes `_`.
fn metric_prefix(prefix: Option<&str>) -> String {
    let raw = prefix
        .filter(|p| !p.is_empty())
        .unwrap_or(DEFAULT_METRICS_PREFIX);
    let mut sanitized: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if sanitized.starts_with(|c: char| c.is_ascii_digit()) {
        sanitized.insert(0, '_');
    }
    sanitized
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric_names(registry: &Registry) -> Vec<String> {
        registry
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect()
    }

    #[test]
    fn test_registers_under_default_prefix() {
        let registry = Registry::new();
        PoolMetrics::new(None, &registry).unwrap();
        let names = metric_names(&registry);
        assert!(names.contains(&"hikaricp_connections_requested".to_string()));
        assert!(names.contains(&"hikaricp_connections_active".to_string()));
        assert_eq!(names.len(), 8);
    }

    #[test]
    fn test_prefix_is_sanitized() {
        assert_eq!(metric_prefix(Some("HikariPool-1")), "HikariPool_1");
        assert_eq!(metric_prefix(Some("1pool")), "_1pool");
        assert_eq!(metric_prefix(Some("")), "hikaricp");
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let registry = Registry::new();
        PoolMetrics::new(Some("metastore"), &registry).unwrap();
        let err = PoolMetrics::new(Some("metastore"), &registry).unwrap_err();
        assert!(matches!(err, crate::error::DbError::Metrics { .. }));
    }

    #[test]
    fn test_observe_sets_gauges() {
        let registry = Registry::new();
        let metrics = PoolMetrics::new(Some("ms"), &registry).unwrap();
        metrics.observe(5, 2, 10);
        assert_eq!(metrics.total_connections.get(), 5);
        assert_eq!(metrics.idle_connections.get(), 2);
        assert_eq!(metrics.active_connections.get(), 3);
        assert_eq!(metrics.max_connections.get(), 10);
    }
}
