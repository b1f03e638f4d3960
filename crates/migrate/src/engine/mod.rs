//! Migration Engine - applies versioned migration files against a database
//!
//! The engine reads migrations from a [`FileSource`] and talks to the database
//! only through the [`Driver`] trait. A driver records a single current
//! version together with a dirty flag; the engine marks a version dirty before
//! running it and clean once it succeeds, so an interrupted migration is
//! detected on the next run instead of being applied twice.

pub mod cockroach;
pub mod source;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info, warn};

pub use cockroach::{CockroachDriver, DriverConfig};
pub use source::{FileSource, Migration, MigrationDirection};

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Error types raised by the migration engine and its drivers
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Every migration in the source is already applied
    #[error("no change")]
    NoChange,

    #[error("Dirty database version {version}. Fix and force version.")]
    Dirty { version: i64 },

    #[error("invalid migration source '{url}': {reason}")]
    InvalidSource { url: String, reason: String },

    #[error("duplicate migration version {version}: '{first}' and '{second}'")]
    DuplicateVersion {
        version: i64,
        first: String,
        second: String,
    },

    #[error("invalid migrations table name '{0}'")]
    InvalidTable(String),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A migration body failed; its version is left dirty
    #[error("migration {version} failed: {message}")]
    Execution { version: i64, message: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Version recorded by a driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionState {
    pub version: i64,
    pub dirty: bool,
}

/// Database side of the engine: version bookkeeping and statement execution
#[async_trait]
pub trait Driver: Send {
    /// Get the recorded version, `None` when nothing has been applied yet
    async fn version(&mut self) -> EngineResult<Option<VersionState>>;

    /// Replace the recorded version
    async fn set_version(&mut self, version: i64, dirty: bool) -> EngineResult<()>;

    /// Execute the body of one migration file
    async fn run(&mut self, migration: &str) -> EngineResult<()>;
}

/// Result of running migrations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRunResult {
    /// Number of migrations that were applied
    pub applied_count: usize,
    /// Versions of migrations that were applied, in order
    pub applied_migrations: Vec<i64>,
    /// Number of migrations that were skipped (already applied)
    pub skipped_count: usize,
    /// Total execution time in milliseconds
    pub execution_time_ms: u128,
}

impl MigrationRunResult {
    /// Result for a run that found nothing to apply
    pub fn unchanged(skipped_count: usize, elapsed: Duration) -> Self {
        Self {
            applied_count: 0,
            applied_migrations: Vec::new(),
            skipped_count,
            execution_time_ms: elapsed.as_millis(),
        }
    }

    /// Check if the run changed the schema
    pub fn is_unchanged(&self) -> bool {
        self.applied_count == 0
    }
}

/// Applies migrations from a file source through a driver
pub struct Engine<D> {
    source: FileSource,
    driver: D,
}

impl<D: Driver> Engine<D> {
    /// Create an engine for the migrations at `source_url` (a `file://` URI)
    /// using an already constructed driver
    pub fn with_database_instance(source_url: &str, driver: D) -> EngineResult<Self> {
        let source = FileSource::open(source_url)?;
        Ok(Self::new(source, driver))
    }

    pub fn new(source: FileSource, driver: D) -> Self {
        Self { source, driver }
    }

    pub fn source(&self) -> &FileSource {
        &self.source
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Apply every migration above the recorded version, in version order.
    ///
    /// Returns [`EngineError::NoChange`] when nothing is pending and
    /// [`EngineError::Dirty`] when a previous run did not finish.
    pub async fn up(&mut self) -> EngineResult<MigrationRunResult> {
        let start_time = Instant::now();

        let current = self.driver.version().await?;
        if let Some(VersionState {
            version,
            dirty: true,
        }) = current
        {
            return Err(EngineError::Dirty { version });
        }
        let current_version = current.map(|state| state.version);

        let (pending, skipped): (Vec<&Migration>, Vec<&Migration>) = self
            .source
            .up_migrations()
            .partition(|m| current_version.map_or(true, |v| m.version > v));

        if pending.is_empty() {
            debug!("no pending migrations (version {:?})", current_version);
            return Err(EngineError::NoChange);
        }

        info!(
            "Running {} migration(s) from version {:?}",
            pending.len(),
            current_version
        );

        let mut applied = Vec::with_capacity(pending.len());
        for migration in pending {
            info!("Applying migration {}: {}", migration.version, migration.name);
            let sql = migration.read_sql()?;

            self.driver.set_version(migration.version, true).await?;

            if sql.trim().is_empty() {
                warn!("migration {} has an empty body", migration.version);
            } else if let Err(e) = self.driver.run(&sql).await {
                return Err(EngineError::Execution {
                    version: migration.version,
                    message: e.to_string(),
                });
            }

            self.driver.set_version(migration.version, false).await?;
            applied.push(migration.version);
        }

        Ok(MigrationRunResult {
            applied_count: applied.len(),
            applied_migrations: applied,
            skipped_count: skipped.len(),
            execution_time_ms: start_time.elapsed().as_millis(),
        })
    }
}
