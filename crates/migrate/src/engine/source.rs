//! File Source - loads versioned migration files from a directory
//!
//! Recognised file names:
//! - `<version>_<title>.up.sql`
//! - `<version>_<title>.down.sql`
//! - `<version>_<title>.sql` (treated as up)
//!
//! Anything else in the directory is ignored.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{EngineError, EngineResult};
use crate::path::MIGRATION_EXTENSION;

const FILE_SCHEME: &str = "file://";

/// Migration direction for execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MigrationDirection {
    /// Apply the migration (run UP statements)
    Up,
    /// Rollback the migration (run DOWN statements)
    Down,
}

/// A migration file discovered by the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    pub version: i64,
    /// Human-readable name taken from the file title
    pub name: String,
    pub direction: MigrationDirection,
    pub path: PathBuf,
}

impl Migration {
    /// Read the SQL body of the migration
    pub fn read_sql(&self) -> EngineResult<String> {
        fs::read_to_string(&self.path).map_err(|source| EngineError::Io {
            path: self.path.clone(),
            source,
        })
    }

    fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Migrations found directly inside one directory, sorted by version
#[derive(Debug, Clone)]
pub struct FileSource {
    root: PathBuf,
    migrations: Vec<Migration>,
}

impl FileSource {
    /// Open a source from a `file://<path>` URI. Relative paths are resolved
    /// against the working directory.
    pub fn open(url: &str) -> EngineResult<Self> {
        let path = url
            .strip_prefix(FILE_SCHEME)
            .ok_or_else(|| EngineError::InvalidSource {
                url: url.to_string(),
                reason: format!("expected a {} URI", FILE_SCHEME),
            })?;

        if path.is_empty() {
            return Err(EngineError::InvalidSource {
                url: url.to_string(),
                reason: "missing path".to_string(),
            });
        }

        Self::from_path(path)
    }

    /// Load every recognised migration directly inside `root`
    pub fn from_path(root: impl Into<PathBuf>) -> EngineResult<Self> {
        let root = root.into();
        let entries = fs::read_dir(&root).map_err(|source| EngineError::Io {
            path: root.clone(),
            source,
        })?;

        let mut migrations: Vec<Migration> = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| EngineError::Io {
                path: root.clone(),
                source,
            })?;

            if !entry.file_type().map_or(false, |ft| ft.is_file()) {
                continue;
            }

            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };

            match parse_file_name(file_name) {
                Some((version, name, direction)) => migrations.push(Migration {
                    version,
                    name,
                    direction,
                    path: entry.path(),
                }),
                None => debug!("ignoring non-migration file {}", file_name),
            }
        }

        migrations.sort_by(|a, b| {
            (a.version, a.direction)
                .cmp(&(b.version, b.direction))
                .then_with(|| a.path.cmp(&b.path))
        });

        if let Some(pair) = migrations
            .windows(2)
            .find(|pair| pair[0].version == pair[1].version && pair[0].direction == pair[1].direction)
        {
            return Err(EngineError::DuplicateVersion {
                version: pair[0].version,
                first: pair[0].file_name(),
                second: pair[1].file_name(),
            });
        }

        Ok(Self { root, migrations })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// All migrations, both directions
    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    /// Up migrations in ascending version order
    pub fn up_migrations(&self) -> impl Iterator<Item = &Migration> {
        self.migrations
            .iter()
            .filter(|m| m.direction == MigrationDirection::Up)
    }
}

/// Parse `<version>_<title>[.up|.down].sql` into its parts
pub fn parse_file_name(file_name: &str) -> Option<(i64, String, MigrationDirection)> {
    let stem = file_name
        .strip_suffix(MIGRATION_EXTENSION)?
        .strip_suffix('.')?;

    let (stem, direction) = if let Some(stem) = stem.strip_suffix(".up") {
        (stem, MigrationDirection::Up)
    } else if let Some(stem) = stem.strip_suffix(".down") {
        (stem, MigrationDirection::Down)
    } else {
        (stem, MigrationDirection::Up)
    };

    let (version, title) = stem.split_once('_')?;
    if version.is_empty() || !version.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let version = version.parse::<i64>().ok()?;

    Some((version, title.replace('_', " "), direction))
}
