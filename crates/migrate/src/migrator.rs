//! Migrator contract shared by every database backend

use async_trait::async_trait;

use crate::engine::MigrationRunResult;
use crate::error::MigrateResult;

/// A database-specific migrator ready to run migrations against a single
/// database.
///
/// Implementations own their connection and migrations path. An `Ok` result
/// covers the case where nothing was pending.
#[async_trait]
pub trait Migrator: Send + Sync {
    /// Apply every pending migration
    async fn migrate(&self) -> MigrateResult<MigrationRunResult>;
}
