//! Database product detection.
//!
//! The metastore only needs to know which vendor sits behind a JDBC URL so it can
//! apply vendor-specific session and driver settings.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Database products the metastore knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbType {
    Derby,
    /// Includes MariaDB
    MySql,
    Postgres,
    Oracle,
    SqlServer,
    Sqlite,
    Undefined,
}

impl DbType {
    /// Get the display name for this database type.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Derby => "Derby",
            Self::MySql => "MySQL",
            Self::Postgres => "PostgreSQL",
            Self::Oracle => "Oracle",
            Self::SqlServer => "SQL Server",
            Self::Sqlite => "SQLite",
            Self::Undefined => "Undefined",
        }
    }

    /// Detect the product from the driver segment of a JDBC URL.
    pub fn from_jdbc_url(jdbc_url: &str) -> Self {
        let lower = jdbc_url.trim().to_lowercase();
        let Some(rest) = lower.strip_prefix("jdbc:") else {
            return Self::Undefined;
        };
        let driver = rest.split(':').next().unwrap_or_default();
        Self::from_str(driver).unwrap_or(Self::Undefined)
    }
}

impl std::fmt::Display for DbType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for DbType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "derby" => Ok(Self::Derby),
            "mysql" | "mariadb" => Ok(Self::MySql),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "oracle" => Ok(Self::Oracle),
            "sqlserver" | "mssql" => Ok(Self::SqlServer),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(format!("Unknown database product: {}", other)),
        }
    }
}

/// Determine the database product for a JDBC URL.
///
/// A recognised `hint` wins over the URL; an unrecognised one is ignored.
pub fn determine_database_product(jdbc_url: &str, hint: Option<&str>) -> DbType {
    hint.and_then(|h| DbType::from_str(h).ok())
        .unwrap_or_else(|| DbType::from_jdbc_url(jdbc_url))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_from_url() {
        let cases = [
            ("jdbc:mysql://db:3306/metastore", DbType::MySql),
            ("jdbc:mariadb://db:3306/metastore", DbType::MySql),
            ("jdbc:postgresql://db:5432/metastore", DbType::Postgres),
            ("JDBC:PostgreSQL://db/metastore", DbType::Postgres),
            ("jdbc:derby:;databaseName=metastore_db;create=true", DbType::Derby),
            ("jdbc:oracle:thin:@db:1521:xe", DbType::Oracle),
            ("jdbc:sqlserver://db:1433;databaseName=ms", DbType::SqlServer),
            ("jdbc:sqlite:/tmp/metastore.db", DbType::Sqlite),
            ("jdbc:h2:mem:test", DbType::Undefined),
            ("mysql://db/metastore", DbType::Undefined),
            ("", DbType::Undefined),
        ];
        for (url, expected) in cases {
            assert_eq!(DbType::from_jdbc_url(url), expected, "url: {url}");
        }
    }

    #[test]
    fn test_hint_overrides_url() {
        assert_eq!(
            determine_database_product("jdbc:mysql://db/ms", Some("postgres")),
            DbType::Postgres
        );
    }

    #[test]
    fn test_unknown_hint_falls_back_to_url() {
        assert_eq!(
            determine_database_product("jdbc:mysql://db/ms", Some("cockroach")),
            DbType::MySql
        );
        assert_eq!(
            determine_database_product("jdbc:mysql://db/ms", None),
            DbType::MySql
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(DbType::MySql.to_string(), "MySQL");
        assert_eq!(DbType::Postgres.to_string(), "PostgreSQL");
    }
}
