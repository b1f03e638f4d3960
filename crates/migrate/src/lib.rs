//! # elif-migrate: schema migrations for elif.rs services
//!
//! Builds a connection target from configuration, checks that a directory
//! holds `.sql` migrations, and applies the pending ones through a
//! versioning migration engine.
//!
//! ```rust,ignore
//! use elif_migrate::{Cockroach, CockroachOptions, ConnectionOptions, Migrator};
//!
//! let options = CockroachOptions::new(ConnectionOptions::new().with_host("crdb"));
//! let migrator = Cockroach::new("./migrations", &options).await?;
//! migrator.migrate().await?;
//! ```

pub mod backends;
pub mod config;
pub mod engine;
pub mod error;
pub mod migrator;
pub mod options;
pub mod path;

// Re-export core traits and types
pub use backends::{Cockroach, CockroachOptions, CockroachTls, ConnectionTarget, DatabaseBackendType};
pub use config::{ConfigError, MigrateConfig};
pub use engine::{EngineError, EngineResult, MigrationRunResult};
pub use error::{MigrateError, MigrateResult};
pub use migrator::Migrator;
pub use options::*;
pub use path::has_migrations;
