//! Error types for the migration runner
//!
//! Configuration, validation and connectivity failures are reported through
//! `MigrateError`. Failures raised by the migration engine are wrapped
//! unmodified so callers can match on the underlying `EngineError`.

use std::path::PathBuf;

use crate::config::ConfigError;
use crate::engine::EngineError;

/// Result type alias for migration runner operations
pub type MigrateResult<T> = Result<T, MigrateError>;

/// Error types for the migration runner
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// Connection options were serialized before a backend set the protocol
    #[error("unrecognised protocol for database connection")]
    MissingProtocol,

    /// Options are inconsistent, e.g. secure transport without TLS material
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("no migration files in given path: {}", .0.display())]
    NoMigrationFiles(PathBuf),

    /// The database or the engine driver could not be reached
    #[error("Connection error: {0}")]
    Connection(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl MigrateError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Check if the error came from the migration engine
    pub fn is_engine(&self) -> bool {
        matches!(self, MigrateError::Engine(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_migration_files_message_names_path() {
        let err = MigrateError::NoMigrationFiles(PathBuf::from("/srv/migrations"));
        assert_eq!(
            err.to_string(),
            "no migration files in given path: /srv/migrations"
        );
    }

    #[test]
    fn test_engine_errors_are_transparent() {
        let err: MigrateError = EngineError::Dirty { version: 4 }.into();
        assert!(err.is_engine());
        assert_eq!(err.to_string(), EngineError::Dirty { version: 4 }.to_string());
    }
}
