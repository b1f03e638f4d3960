//! CockroachDB Backend
//!
//! `CockroachOptions` extends the generic connection options with secure
//! transport material and the name of the migration history table, and
//! `Cockroach` runs migrations against a CockroachDB cluster over the
//! Postgres wire protocol.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use percent_encoding::percent_decode_str;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use tracing::{info, warn};
use url::{form_urlencoded, Url};

use super::DatabaseBackendType;
use crate::config::MigrateConfig;
use crate::engine::cockroach::validate_table_name;
use crate::engine::{
    CockroachDriver, Driver, DriverConfig, Engine, EngineError, MigrationRunResult,
};
use crate::error::{MigrateError, MigrateResult};
use crate::migrator::Migrator;
use crate::options::{
    ConnectionOptions, DEFAULT_DATABASE, DEFAULT_HOST, DEFAULT_MIGRATION_TABLE, DEFAULT_PORT,
    DEFAULT_USER,
};
use crate::path::has_migrations;

/// Query parameter carrying the migration history table name. Parameters
/// prefixed with `x-` are consumed here and never reach the database driver.
pub const MIGRATIONS_TABLE_PARAM: &str = "x-migrations-table";

const CUSTOM_PARAM_PREFIX: &str = "x-";

/// Where the connection fields come from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConnectionTarget {
    /// Every connection field and backend option at its default
    #[default]
    Default,
    /// Caller-provided fields, defaults applied to the empty ones
    Custom(ConnectionOptions),
}

/// Paths to the TLS material on disk for connecting to a secure cluster
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CockroachTls {
    pub cert_path: String,
    pub key_path: String,
    /// Value passed through as `sslmode`, e.g. `verify-full`
    pub mode: String,
    pub root_cert: String,
}

impl CockroachTls {
    fn validate(&self) -> MigrateResult<()> {
        let fields = [
            ("cert_path", &self.cert_path),
            ("key_path", &self.key_path),
            ("mode", &self.mode),
            ("root_cert", &self.root_cert),
        ];

        match fields.iter().find(|(_, value)| value.is_empty()) {
            Some((name, _)) => Err(MigrateError::configuration(format!(
                "secure connection requires TLS field '{}'",
                name
            ))),
            None => Ok(()),
        }
    }
}

/// Options for connecting to CockroachDB to run migrations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CockroachOptions {
    pub connection: ConnectionTarget,
    /// Table to store migration history in; `schema_migrations` when empty
    pub migration_table: String,
    /// Connect over TLS using the material in `tls`
    pub secure: bool,
    pub tls: Option<CockroachTls>,
}

impl CockroachOptions {
    /// Options for a custom connection, insecure, default migration table
    pub fn new(connection: ConnectionOptions) -> Self {
        Self {
            connection: ConnectionTarget::Custom(connection),
            ..Default::default()
        }
    }

    pub fn with_migration_table(mut self, table: impl Into<String>) -> Self {
        self.migration_table = table.into();
        self
    }

    /// Enable secure transport with the given TLS material
    pub fn with_tls(mut self, tls: CockroachTls) -> Self {
        self.secure = true;
        self.tls = Some(tls);
        self
    }

    pub fn migration_table_or_default(&self) -> &str {
        if self.migration_table.is_empty() {
            DEFAULT_MIGRATION_TABLE
        } else {
            &self.migration_table
        }
    }

    /// Check that secure transport comes with complete TLS material and that
    /// the migration table is a plain identifier
    pub fn validate(&self) -> MigrateResult<()> {
        if !self.migration_table.is_empty() {
            validate_table_name(&self.migration_table)
                .map_err(|e| MigrateError::configuration(e.to_string()))?;
        }

        if !self.secure {
            return Ok(());
        }

        if self.connection == ConnectionTarget::Default {
            return Err(MigrateError::configuration(
                "secure connection requires custom connection options",
            ));
        }

        match &self.tls {
            Some(tls) => tls.validate(),
            None => Err(MigrateError::configuration(
                "secure connection requested without TLS material",
            )),
        }
    }

    /// Build the connection string, applying defaults to unset options.
    ///
    /// Query values are form-url-encoded, so the result always parses back
    /// into the key/value pairs it was built from.
    pub fn connection_string(&self) -> MigrateResult<String> {
        self.validate()?;

        let options = match &self.connection {
            ConnectionTarget::Default => {
                if !self.migration_table.is_empty() {
                    warn!("default connection target ignores the migration table setting");
                }
                return Ok(default_connection_string());
            }
            ConnectionTarget::Custom(options) => options,
        };

        let mut options = options.clone();
        options.set_protocol(DatabaseBackendType::CockroachDB.protocol());
        let prefab = options.serialize()?;

        let mut query = form_urlencoded::Serializer::new(String::new());
        match (&self.tls, self.secure) {
            (Some(tls), true) => {
                query
                    .append_pair("sslmode", &tls.mode)
                    .append_pair("sslcert", &tls.cert_path)
                    .append_pair("sslkey", &tls.key_path)
                    .append_pair("sslrootcert", &tls.root_cert);
            }
            _ => {
                query.append_pair("sslmode", "disable");
            }
        }
        query.append_pair(MIGRATIONS_TABLE_PARAM, self.migration_table_or_default());

        Ok(format!("{}?{}", prefab, query.finish()))
    }
}

fn default_connection_string() -> String {
    format!(
        "{}://{}@{}:{}/{}?sslmode=disable&{}={}",
        DatabaseBackendType::CockroachDB.protocol(),
        DEFAULT_USER,
        DEFAULT_HOST,
        DEFAULT_PORT,
        DEFAULT_DATABASE,
        MIGRATIONS_TABLE_PARAM,
        DEFAULT_MIGRATION_TABLE,
    )
}

/// Split a connection string into driver options and the migrations table
/// named by its `x-migrations-table` parameter.
fn split_connection_string(conn: &str) -> MigrateResult<(PgConnectOptions, String)> {
    let mut url = Url::parse(conn)
        .map_err(|e| MigrateError::configuration(format!("invalid connection string: {}", e)))?;

    let mut migrations_table = DEFAULT_MIGRATION_TABLE.to_string();
    let mut driver_params = Vec::new();
    for (key, value) in url.query_pairs() {
        if key == MIGRATIONS_TABLE_PARAM {
            if !value.is_empty() {
                migrations_table = value.into_owned();
            }
        } else if !key.starts_with(CUSTOM_PARAM_PREFIX) {
            driver_params.push((key.into_owned(), value.into_owned()));
        }
    }

    url.set_query(None);
    if !driver_params.is_empty() {
        url.query_pairs_mut().extend_pairs(driver_params);
    }

    let mut options = PgConnectOptions::from_str(url.as_str())
        .map_err(|e| MigrateError::configuration(format!("invalid connection string: {}", e)))?;

    // sqlx takes the path verbatim, so undo the encoding applied on serialize
    if let Some(segment) = url.path_segments().and_then(|mut s| s.next()).filter(|s| !s.is_empty()) {
        let database = percent_decode_str(segment)
            .decode_utf8()
            .map_err(|e| MigrateError::configuration(format!("invalid database name: {}", e)))?;
        options = options.database(&database);
    }

    Ok((options, migrations_table))
}

/// Database connection along with what is needed to run migrations
/// against CockroachDB.
#[derive(Debug)]
pub struct Cockroach {
    pool: PgPool,
    migrations_path: PathBuf,
    migrations_table: String,
}

impl Cockroach {
    /// Validate the migrations path, build the connection string and open a
    /// connection to the cluster.
    pub async fn new(path: impl Into<PathBuf>, options: &CockroachOptions) -> MigrateResult<Self> {
        Self::open(path.into(), options, PgPoolOptions::new()).await
    }

    /// Construct a migrator from loaded configuration
    pub async fn connect(config: &MigrateConfig) -> MigrateResult<Self> {
        config.validate()?;

        let mut pool_options = PgPoolOptions::new();
        if let Some(seconds) = config.connect_timeout_seconds {
            pool_options = pool_options.acquire_timeout(Duration::from_secs(seconds));
        }

        let path = config.migrations_path.clone().unwrap_or_default();
        Self::open(path, &config.cockroach_options(), pool_options).await
    }

    async fn open(
        path: PathBuf,
        options: &CockroachOptions,
        pool_options: PgPoolOptions,
    ) -> MigrateResult<Self> {
        if !has_migrations(&path) {
            return Err(MigrateError::NoMigrationFiles(path));
        }

        let conn = options.connection_string()?;
        let (connect_options, migrations_table) = split_connection_string(&conn)?;

        let pool = pool_options
            .max_connections(1)
            .connect_with(connect_options)
            .await
            .map_err(|e| {
                MigrateError::connection(format!("Failed to connect to CockroachDB: {}", e))
            })?;

        info!(
            "Connected to CockroachDB, migrations from {}",
            path.display()
        );

        Ok(Self {
            pool,
            migrations_path: path,
            migrations_table,
        })
    }

    pub fn migrations_path(&self) -> &Path {
        &self.migrations_path
    }

    pub fn migrations_table(&self) -> &str {
        &self.migrations_table
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Close the connection
    pub async fn close(self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl Migrator for Cockroach {
    async fn migrate(&self) -> MigrateResult<MigrationRunResult> {
        let start_time = Instant::now();

        let driver = CockroachDriver::with_instance(
            self.pool.clone(),
            DriverConfig {
                migrations_table: self.migrations_table.clone(),
            },
        )
        .await
        .map_err(|e| MigrateError::connection(format!("could not get migrations driver: {}", e)))?;

        let source_url = format!("file://{}", self.migrations_path.display());
        let mut engine = Engine::with_database_instance(&source_url, driver)?;

        apply_pending(&mut engine, start_time).await
    }
}

/// Run the engine forward. An engine with nothing pending counts as success;
/// every other engine failure is passed through unchanged.
async fn apply_pending<D: Driver>(
    engine: &mut Engine<D>,
    start_time: Instant,
) -> MigrateResult<MigrationRunResult> {
    match engine.up().await {
        Ok(result) => {
            info!(
                "Applied {} migration(s) in {}ms",
                result.applied_count, result.execution_time_ms
            );
            Ok(result)
        }
        Err(EngineError::NoChange) => {
            info!("Schema is up to date");
            Ok(MigrationRunResult::unchanged(
                engine.source().up_migrations().count(),
                start_time.elapsed(),
            ))
        }
        Err(e) => Err(e.into()),
    }
}
