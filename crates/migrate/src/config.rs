//! Migration runner configuration
//!
//! Loaded from `COCKROACH_*` environment variables or from a YAML file and
//! converted into `CockroachOptions`.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use crate::backends::{CockroachOptions, CockroachTls, ConnectionTarget};
use crate::options::ConnectionOptions;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required field: {field}. {hint}")]
    MissingRequired { field: String, hint: String },

    #[error("Invalid value for field '{field}': '{value}'. Expected: {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ConfigError {
    /// Create a missing required field error
    pub fn missing_required(field: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::MissingRequired {
            field: field.into(),
            hint: hint.into(),
        }
    }

    /// Create an invalid value error
    pub fn invalid_value(
        field: impl Into<String>,
        value: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            expected: expected.into(),
        }
    }
}

/// Settings for running migrations against CockroachDB
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MigrateConfig {
    /// Directory holding the `.sql` migration files
    pub migrations_path: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub migration_table: Option<String>,
    pub secure: bool,
    pub ssl_cert: Option<String>,
    pub ssl_key: Option<String>,
    pub ssl_mode: Option<String>,
    pub ssl_root_cert: Option<String>,
    /// Seconds to wait for the initial connection
    pub connect_timeout_seconds: Option<u64>,
}

impl MigrateConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            migrations_path: env_string("MIGRATIONS_PATH").map(PathBuf::from),
            host: env_string("COCKROACH_HOST"),
            port: env_parse("COCKROACH_PORT", "valid port number (0-65535)")?,
            user: env_string("COCKROACH_USER"),
            password: env_string("COCKROACH_PASSWORD"),
            database: env_string("COCKROACH_DATABASE"),
            migration_table: env_string("COCKROACH_MIGRATIONS_TABLE"),
            secure: env_bool("COCKROACH_SECURE")?.unwrap_or(false),
            ssl_cert: env_string("COCKROACH_SSL_CERT"),
            ssl_key: env_string("COCKROACH_SSL_KEY"),
            ssl_mode: env_string("COCKROACH_SSL_MODE"),
            ssl_root_cert: env_string("COCKROACH_SSL_ROOT_CERT"),
            connect_timeout_seconds: env_parse(
                "COCKROACH_CONNECT_TIMEOUT",
                "number of seconds",
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Load configuration from YAML text
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.migrations_path {
            Some(path) if !path.as_os_str().is_empty() => {}
            _ => {
                return Err(ConfigError::missing_required(
                    "migrations_path",
                    "MIGRATIONS_PATH must point at the directory holding .sql migrations",
                ))
            }
        }

        if self.secure {
            let tls_fields = [
                ("ssl_cert", &self.ssl_cert, "COCKROACH_SSL_CERT"),
                ("ssl_key", &self.ssl_key, "COCKROACH_SSL_KEY"),
                ("ssl_mode", &self.ssl_mode, "COCKROACH_SSL_MODE"),
                ("ssl_root_cert", &self.ssl_root_cert, "COCKROACH_SSL_ROOT_CERT"),
            ];
            for (field, value, var) in tls_fields {
                if value.as_deref().map_or(true, str::is_empty) {
                    return Err(ConfigError::missing_required(
                        field,
                        format!("{} is required when secure is enabled", var),
                    ));
                }
            }
        }

        Ok(())
    }

    /// Convert to backend options.
    ///
    /// Falls back to [`ConnectionTarget::Default`] only when nothing besides
    /// the migrations path is configured.
    pub fn cockroach_options(&self) -> CockroachOptions {
        let has_connection_fields = self.host.is_some()
            || self.port.is_some()
            || self.user.is_some()
            || self.password.is_some()
            || self.database.is_some();

        let migration_table = self.migration_table.clone().unwrap_or_default();
        if !has_connection_fields && !self.secure && migration_table.is_empty() {
            return CockroachOptions::default();
        }

        let connection = ConnectionOptions::new()
            .with_host(self.host.clone().unwrap_or_default())
            .with_port(self.port.unwrap_or_default())
            .with_user(self.user.clone().unwrap_or_default())
            .with_password(self.password.clone().unwrap_or_default())
            .with_database(self.database.clone().unwrap_or_default());

        let tls = self.secure.then(|| CockroachTls {
            cert_path: self.ssl_cert.clone().unwrap_or_default(),
            key_path: self.ssl_key.clone().unwrap_or_default(),
            mode: self.ssl_mode.clone().unwrap_or_default(),
            root_cert: self.ssl_root_cert.clone().unwrap_or_default(),
        });

        CockroachOptions {
            connection: ConnectionTarget::Custom(connection),
            migration_table,
            secure: self.secure,
            tls,
        }
    }
}

fn env_string(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.is_empty())
}

fn env_parse<T: FromStr>(name: &str, expected: &str) -> Result<Option<T>, ConfigError> {
    match env_string(name) {
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::invalid_value(name, value, expected)),
        None => Ok(None),
    }
}

fn env_bool(name: &str) -> Result<Option<bool>, ConfigError> {
    match env_string(name) {
        Some(value) => match value.to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(Some(true)),
            "false" | "0" | "no" => Ok(Some(false)),
            _ => Err(ConfigError::invalid_value(name, value, "true or false")),
        },
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const ENV_VARS: &[&str] = &[
        "MIGRATIONS_PATH",
        "COCKROACH_HOST",
        "COCKROACH_PORT",
        "COCKROACH_USER",
        "COCKROACH_PASSWORD",
        "COCKROACH_DATABASE",
        "COCKROACH_MIGRATIONS_TABLE",
        "COCKROACH_SECURE",
        "COCKROACH_SSL_CERT",
        "COCKROACH_SSL_KEY",
        "COCKROACH_SSL_MODE",
        "COCKROACH_SSL_ROOT_CERT",
        "COCKROACH_CONNECT_TIMEOUT",
    ];

    fn clear_env() {
        for var in ENV_VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear_env();
        env::set_var("MIGRATIONS_PATH", "./migrations");

        let config = MigrateConfig::from_env().unwrap();
        assert_eq!(config.migrations_path, Some(PathBuf::from("./migrations")));
        assert!(!config.secure);
        assert_eq!(config.cockroach_options(), CockroachOptions::default());

        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_connection_fields() {
        clear_env();
        env::set_var("MIGRATIONS_PATH", "./migrations");
        env::set_var("COCKROACH_HOST", "test-host");
        env::set_var("COCKROACH_PORT", "9001");
        env::set_var("COCKROACH_USER", "test-user");
        env::set_var("COCKROACH_DATABASE", "test-database");
        env::set_var("COCKROACH_MIGRATIONS_TABLE", "migration_table");

        let config = MigrateConfig::from_env().unwrap();
        assert_eq!(
            config.cockroach_options().connection_string().unwrap(),
            "postgresql://test-user@test-host:9001/test-database?sslmode=disable&x-migrations-table=migration_table"
        );

        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_invalid_port() {
        clear_env();
        env::set_var("MIGRATIONS_PATH", "./migrations");
        env::set_var("COCKROACH_PORT", "not-a-port");

        match MigrateConfig::from_env() {
            Err(ConfigError::InvalidValue { field, value, .. }) => {
                assert_eq!(field, "COCKROACH_PORT");
                assert_eq!(value, "not-a-port");
            }
            other => panic!("expected invalid value, got {:?}", other),
        }

        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_requires_migrations_path() {
        clear_env();

        assert!(matches!(
            MigrateConfig::from_env(),
            Err(ConfigError::MissingRequired { field, .. }) if field == "migrations_path"
        ));
    }

    #[test]
    #[serial]
    fn test_from_env_invalid_secure_flag() {
        clear_env();
        env::set_var("MIGRATIONS_PATH", "./migrations");
        env::set_var("COCKROACH_SECURE", "maybe");

        assert!(matches!(
            MigrateConfig::from_env(),
            Err(ConfigError::InvalidValue { .. })
        ));

        clear_env();
    }

    #[test]
    fn test_yaml_secure_config() {
        let config = MigrateConfig::from_yaml_str(
            r#"
migrations_path: /srv/migrations
host: crdb
secure: true
ssl_cert: /certs/client.crt
ssl_key: /certs/client.key
ssl_mode: verify-full
ssl_root_cert: /certs/ca.crt
connect_timeout_seconds: 5
"#,
        )
        .unwrap();

        assert_eq!(config.connect_timeout_seconds, Some(5));
        let options = config.cockroach_options();
        assert!(options.secure);
        assert_eq!(options.tls.as_ref().unwrap().mode, "verify-full");

        let conn = options.connection_string().unwrap();
        assert!(conn.starts_with("postgresql://root@crdb:26257/service?sslmode=verify-full&"));
    }

    #[test]
    fn test_yaml_secure_requires_tls() {
        let result = MigrateConfig::from_yaml_str(
            "migrations_path: /srv/migrations\nsecure: true\nssl_cert: /certs/client.crt\n",
        );

        assert!(matches!(
            result,
            Err(ConfigError::MissingRequired { field, .. }) if field == "ssl_key"
        ));
    }

    #[test]
    fn test_yaml_rejects_unknown_fields() {
        let result = MigrateConfig::from_yaml_str("migrations_path: ./m\nhots: typo\n");
        assert!(matches!(result, Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn test_secure_without_connection_fields_is_custom() {
        let config = MigrateConfig {
            migrations_path: Some(PathBuf::from("./migrations")),
            secure: true,
            ssl_cert: Some("c".to_string()),
            ssl_key: Some("k".to_string()),
            ssl_mode: Some("require".to_string()),
            ssl_root_cert: Some("r".to_string()),
            ..Default::default()
        };

        let options = config.cockroach_options();
        assert!(matches!(options.connection, ConnectionTarget::Custom(_)));
        assert!(options.connection_string().unwrap().contains("sslmode=require"));
    }

    #[test]
    fn test_from_yaml_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("migrate.yaml");
        fs::write(&file, "migrations_path: ./migrations\ndatabase: orders\n").unwrap();

        let config = MigrateConfig::from_yaml_file(&file).unwrap();
        assert_eq!(config.database.as_deref(), Some("orders"));
        assert!(matches!(
            MigrateConfig::from_yaml_file(dir.path().join("missing.yaml")),
            Err(ConfigError::Io(_))
        ));
    }
}
