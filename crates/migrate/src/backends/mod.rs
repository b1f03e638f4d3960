//! Database Backends
//!
//! One module per supported database. Each backend wraps the generic
//! `ConnectionOptions` with its own options type and provides a `Migrator`.

pub mod cockroach;

pub use cockroach::{Cockroach, CockroachOptions, CockroachTls, ConnectionTarget};

/// Database backend type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseBackendType {
    CockroachDB,
}

impl DatabaseBackendType {
    /// Wire protocol used in the backend's connection strings
    pub fn protocol(&self) -> &'static str {
        match self {
            DatabaseBackendType::CockroachDB => "postgresql",
        }
    }
}

impl std::fmt::Display for DatabaseBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseBackendType::CockroachDB => write!(f, "cockroachdb"),
        }
    }
}

impl std::str::FromStr for DatabaseBackendType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cockroachdb" | "cockroach" | "crdb" => Ok(DatabaseBackendType::CockroachDB),
            _ => Err(format!("Unsupported database backend: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_type_parsing() {
        assert_eq!(
            "CockroachDB".parse::<DatabaseBackendType>(),
            Ok(DatabaseBackendType::CockroachDB)
        );
        assert_eq!("crdb".parse::<DatabaseBackendType>(), Ok(DatabaseBackendType::CockroachDB));
        assert!("mysql".parse::<DatabaseBackendType>().is_err());
    }

    #[test]
    fn test_backend_protocol() {
        assert_eq!(DatabaseBackendType::CockroachDB.protocol(), "postgresql");
        assert_eq!(DatabaseBackendType::CockroachDB.to_string(), "cockroachdb");
    }
}
