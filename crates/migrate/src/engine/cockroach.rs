//! CockroachDB driver for the migration engine
//!
//! Keeps the applied version in a single-row table and executes migration
//! bodies over the Postgres wire protocol through sqlx.

use async_trait::async_trait;
use sqlx::{Executor, PgPool, Row};
use tracing::debug;

use super::{Driver, EngineError, EngineResult, VersionState};
use crate::options::DEFAULT_MIGRATION_TABLE;

/// Configuration for the CockroachDB driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    /// Table name for tracking the applied version
    pub migrations_table: String,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            migrations_table: DEFAULT_MIGRATION_TABLE.to_string(),
        }
    }
}

/// Engine driver using an existing CockroachDB connection pool
pub struct CockroachDriver {
    pool: PgPool,
    config: DriverConfig,
}

impl CockroachDriver {
    /// Wrap an open pool, creating the version table if it does not exist
    pub async fn with_instance(pool: PgPool, config: DriverConfig) -> EngineResult<Self> {
        validate_table_name(&config.migrations_table)?;

        let driver = Self { pool, config };
        driver.ensure_version_table().await?;
        Ok(driver)
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    async fn ensure_version_table(&self) -> EngineResult<()> {
        debug!("ensuring migrations table {}", self.config.migrations_table);
        sqlx::query(&create_version_table_sql(&self.config.migrations_table))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Driver for CockroachDriver {
    async fn version(&mut self) -> EngineResult<Option<VersionState>> {
        let sql = format!(
            "SELECT version, dirty FROM {} LIMIT 1",
            self.config.migrations_table
        );
        let row = sqlx::query(&sql).fetch_optional(&self.pool).await?;

        match row {
            Some(row) => Ok(Some(VersionState {
                version: row.try_get("version")?,
                dirty: row.try_get("dirty")?,
            })),
            None => Ok(None),
        }
    }

    async fn set_version(&mut self, version: i64, dirty: bool) -> EngineResult<()> {
        let table = &self.config.migrations_table;
        let mut transaction = self.pool.begin().await?;

        sqlx::query(&format!("DELETE FROM {}", table))
            .execute(&mut *transaction)
            .await?;
        sqlx::query(&format!(
            "INSERT INTO {} (version, dirty) VALUES ($1, $2)",
            table
        ))
        .bind(version)
        .bind(dirty)
        .execute(&mut *transaction)
        .await?;

        transaction.commit().await?;
        Ok(())
    }

    async fn run(&mut self, migration: &str) -> EngineResult<()> {
        // No bind arguments: the body goes through the simple query protocol,
        // which accepts several statements at once.
        self.pool.execute(migration).await?;
        Ok(())
    }
}

/// SQL to create the version tracking table
fn create_version_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (version INT8 NOT NULL PRIMARY KEY, dirty BOOL NOT NULL)",
        table
    )
}

/// Table names are interpolated into SQL, so only plain (optionally
/// schema-qualified) identifiers are accepted.
pub(crate) fn validate_table_name(table: &str) -> EngineResult<()> {
    let valid = !table.is_empty()
        && table.split('.').all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        });

    if valid {
        Ok(())
    } else {
        Err(EngineError::InvalidTable(table.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table() {
        assert_eq!(DriverConfig::default().migrations_table, "schema_migrations");
    }

    #[test]
    fn test_create_version_table_sql() {
        let sql = create_version_table_sql("migration_table");
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS migration_table"));
        assert!(sql.contains("version INT8 NOT NULL PRIMARY KEY"));
        assert!(sql.contains("dirty BOOL NOT NULL"));
    }

    #[test]
    fn test_validate_table_name() {
        assert!(validate_table_name("schema_migrations").is_ok());
        assert!(validate_table_name("public.schema_migrations").is_ok());
        assert!(validate_table_name("_history2").is_ok());

        for bad in ["", "1table", "users; DROP TABLE x", "a..b", "tab-le", "public."] {
            assert!(
                matches!(validate_table_name(bad), Err(EngineError::InvalidTable(_))),
                "{} should be rejected",
                bad
            );
        }
    }
}
