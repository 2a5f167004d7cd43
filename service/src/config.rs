//! Configuration management for the order service.
//!
//! Settings come from three layers, highest priority first:
//!
//! 1. environment variables (a `.env` file in the working directory is loaded into the
//!    environment first, see `main`)
//! 2. a YAML file: `CONFIG_FILE` if set, otherwise `config.yaml` when it exists
//! 3. built-in defaults
//!
//! ```yaml
//! http:
//!   port: 8080
//! database:
//!   host: localhost
//!   password: user
//! kafka:
//!   brokers: [localhost:9092]
//!   topic: orders
//! ```
//!
//! Each file key maps to one variable (`database.max_connections` is `DB_MAX_CONNECTIONS`, see
//! [`FILE_KEYS`]). Unknown keys are rejected.

use sqlx::postgres::PgConnectOptions;
use serde_yaml::Value;
use std::collections::HashMap;
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default configuration file, read when present.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// `(section, key, variable)` for every setting a configuration file may hold.
pub const FILE_KEYS: &[(&str, &str, &str)] = &[
    ("http", "host", "HTTP_HOST"),
    ("http", "port", "HTTP_PORT"),
    ("http", "static_dir", "STATIC_DIR"),
    ("http", "request_timeout", "HTTP_REQUEST_TIMEOUT"),
    ("http", "shutdown_timeout", "SHUTDOWN_TIMEOUT"),
    ("database", "url", "DATABASE_URL"),
    ("database", "host", "DB_HOST"),
    ("database", "port", "DB_PORT"),
    ("database", "username", "DB_USERNAME"),
    ("database", "password", "DB_PASSWORD"),
    ("database", "name", "DB_NAME"),
    ("database", "max_connections", "DB_MAX_CONNECTIONS"),
    ("database", "min_connections", "DB_MIN_CONNECTIONS"),
    ("database", "connect_timeout", "DB_CONNECT_TIMEOUT"),
    ("kafka", "brokers", "KAFKA_BROKERS"),
    ("kafka", "topic", "KAFKA_TOPIC"),
    ("kafka", "group_id", "KAFKA_GROUP_ID"),
    ("kafka", "min_bytes", "KAFKA_MIN_BYTES"),
    ("kafka", "max_bytes", "KAFKA_MAX_BYTES"),
    ("kafka", "auto_offset_reset", "KAFKA_AUTO_OFFSET_RESET"),
    ("kafka", "fetch_timeout_ms", "KAFKA_FETCH_TIMEOUT_MS"),
    ("cache", "restore_timeout", "CACHE_RESTORE_TIMEOUT"),
    ("ingest", "dead_letter", "INGEST_DEAD_LETTER"),
    ("ingest", "retry_delay_ms", "INGEST_RETRY_DELAY_MS"),
    ("metrics", "enabled", "METRICS_ENABLED"),
];

/// Configuration that cannot be used.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The value could not be parsed
    #[error("Invalid value {value:?} for {key}: {reason}")]
    Invalid {
        /// Environment variable name
        key: &'static str,
        /// Raw value
        value: String,
        /// Parser message
        reason: String,
    },

    /// The configuration file could not be read or has an unexpected shape
    #[error("Invalid configuration file {path}: {reason}")]
    File {
        /// File path
        path: String,
        /// What went wrong
        reason: String,
    },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// HTTP server configuration
    pub http: HttpConfig,
    /// `PostgreSQL` configuration
    pub database: DatabaseConfig,
    /// Kafka/Redpanda consumer configuration
    pub kafka: KafkaConfig,
    /// Cache bootstrap configuration
    pub cache: CacheConfig,
    /// Ingestion loop configuration
    pub ingest: IngestConfig,
    /// Metrics configuration
    pub metrics: MetricsConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
    /// Directory holding `index.html` and the static assets
    pub static_dir: String,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Time allowed for background work to finish after the server stops
    pub shutdown_timeout: Duration,
}

impl HttpConfig {
    /// `host:port` to bind the listener to.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// `PostgreSQL` configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// Full connection URL; overrides the individual parts when set
    pub url: Option<String>,
    /// Database host
    pub host: String,
    /// Database port
    pub port: u16,
    /// Database user
    pub username: String,
    /// Database password
    pub password: String,
    /// Database name
    pub name: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of idle connections in the pool
    pub min_connections: u32,
    /// How long to wait for a pooled connection
    pub connect_timeout: Duration,
}

impl DatabaseConfig {
    /// Connection options, parsed from `DATABASE_URL` when given, otherwise built from the
    /// parts. Credentials from the parts are passed as-is, so they may contain any character.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `DATABASE_URL` cannot be parsed.
    pub fn connect_options(&self) -> Result<PgConnectOptions, ConfigError> {
        match &self.url {
            Some(url) => url.parse().map_err(|e: sqlx::Error| ConfigError::Invalid {
                key: "DATABASE_URL",
                value: redact_password(url),
                reason: e.to_string(),
            }),
            None => Ok(PgConnectOptions::new()
                .host(&self.host)
                .port(self.port)
                .username(&self.username)
                .password(&self.password)
                .database(&self.name)),
        }
    }

    /// Connection URL with the password masked, for logs.
    #[must_use]
    pub fn redacted_url(&self) -> String {
        match &self.url {
            Some(url) => redact_password(url),
            None => format!(
                "postgres://{}:***@{}:{}/{}",
                self.username, self.host, self.port, self.name
            ),
        }
    }
}

/// Kafka/Redpanda consumer configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KafkaConfig {
    /// Broker addresses (comma-separated)
    pub brokers: String,
    /// Topic carrying orders
    pub topic: String,
    /// Consumer group
    pub group_id: String,
    /// Minimum bytes per fetch
    pub min_bytes: u32,
    /// Maximum bytes per fetch
    pub max_bytes: u32,
    /// Where to start without a committed offset: `earliest` or `latest`
    pub auto_offset_reset: String,
    /// How long one fetch waits before reporting idle
    pub fetch_timeout: Duration,
}

/// Cache bootstrap configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Deadline for loading every stored order at startup
    pub restore_timeout: Duration,
}

/// Ingestion loop configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestConfig {
    /// Record skipped messages in the `failed_messages` table
    pub dead_letter: bool,
    /// Back-off after a transport error
    pub retry_delay: Duration,
}

/// Metrics configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsConfig {
    /// Install the Prometheus recorder and serve `/metrics`
    pub enabled: bool,
}

impl Config {
    /// Load configuration from the process environment and the optional configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a value cannot be parsed, if `CONFIG_FILE` names a file that
    /// cannot be read, or if the file is malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let file = match env_var("CONFIG_FILE") {
            Some(path) => FileValues::from_yaml_file(Path::new(&path))?,
            None => FileValues::from_yaml_file_if_exists(Path::new(DEFAULT_CONFIG_FILE))?,
        };
        Self::from_sources(env_var, &file)
    }

    /// Load configuration from variables layered over file values.
    ///
    /// A non-blank variable wins over the file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a value cannot be parsed.
    pub fn from_sources(
        env: impl Fn(&str) -> Option<String>,
        file: &FileValues,
    ) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| {
            env(key)
                .filter(|v| !v.trim().is_empty())
                .or_else(|| file.get(key))
        })
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a value cannot be parsed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);

        let config = Self {
            http: HttpConfig {
                host: env.string("HTTP_HOST", "0.0.0.0"),
                port: env.parse("HTTP_PORT", 8080)?,
                static_dir: env.string("STATIC_DIR", "web/static"),
                request_timeout: env.secs("HTTP_REQUEST_TIMEOUT", 10)?,
                shutdown_timeout: env.secs("SHUTDOWN_TIMEOUT", 30)?,
            },
            database: DatabaseConfig {
                url: env.optional("DATABASE_URL"),
                host: env.string("DB_HOST", "localhost"),
                port: env.parse("DB_PORT", 5432)?,
                username: env.string("DB_USERNAME", "user"),
                password: env.string("DB_PASSWORD", "user"),
                name: env.string("DB_NAME", "orders"),
                max_connections: env.parse("DB_MAX_CONNECTIONS", 25)?,
                min_connections: env.parse("DB_MIN_CONNECTIONS", 5)?,
                connect_timeout: env.secs("DB_CONNECT_TIMEOUT", 5)?,
            },
            kafka: KafkaConfig {
                brokers: env.string("KAFKA_BROKERS", "localhost:9092"),
                topic: env.string("KAFKA_TOPIC", "orders"),
                group_id: env.string("KAFKA_GROUP_ID", "orders-service-group"),
                min_bytes: env.parse("KAFKA_MIN_BYTES", 10_000)?,
                max_bytes: env.parse("KAFKA_MAX_BYTES", 10_000_000)?,
                auto_offset_reset: env.string("KAFKA_AUTO_OFFSET_RESET", "earliest"),
                fetch_timeout: env.millis("KAFKA_FETCH_TIMEOUT_MS", 1000)?,
            },
            cache: CacheConfig {
                restore_timeout: env.secs("CACHE_RESTORE_TIMEOUT", 10)?,
            },
            ingest: IngestConfig {
                dead_letter: env.flag("INGEST_DEAD_LETTER", false)?,
                retry_delay: env.millis("INGEST_RETRY_DELAY_MS", 1000)?,
            },
            metrics: MetricsConfig {
                enabled: env.flag("METRICS_ENABLED", true)?,
            },
        };
        config.database.connect_options()?;
        Ok(config)
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Settings read from a YAML configuration file, keyed by variable name.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FileValues(HashMap<&'static str, String>);

impl FileValues {
    /// Read and parse `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::File`] if the file cannot be read or parsed.
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let file_error = |reason: String| ConfigError::File {
            path: path.display().to_string(),
            reason,
        };
        let content = std::fs::read_to_string(path).map_err(|e| file_error(e.to_string()))?;
        Self::from_yaml_str(&content).map_err(file_error)
    }

    /// Like [`from_yaml_file`](Self::from_yaml_file), but a missing file yields no values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::File`] if the file exists but cannot be read or parsed.
    pub fn from_yaml_file_if_exists(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_yaml_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse a YAML document of `section: { key: value }` mappings.
    ///
    /// Lists are joined with commas, so `brokers: [a:9092, b:9092]` reads as `a:9092,b:9092`.
    ///
    /// # Errors
    ///
    /// Returns a description of the first malformed or unknown entry.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, String> {
        let root: Value = serde_yaml::from_str(yaml).map_err(|e| e.to_string())?;
        let sections = match root {
            Value::Null => return Ok(Self::default()),
            Value::Mapping(sections) => sections,
            _ => return Err("expected a mapping of sections".to_string()),
        };

        let mut values = HashMap::new();
        for (section, body) in sections {
            let section = section
                .as_str()
                .ok_or_else(|| "section names must be strings".to_string())?;
            let body = match body {
                Value::Null => continue,
                Value::Mapping(body) => body,
                _ => return Err(format!("section {section} must be a mapping")),
            };

            for (key, value) in body {
                let key = key
                    .as_str()
                    .ok_or_else(|| format!("keys in {section} must be strings"))?;
                let variable = FILE_KEYS
                    .iter()
                    .find(|(s, k, _)| *s == section && *k == key)
                    .map(|(_, _, variable)| *variable)
                    .ok_or_else(|| format!("unknown setting {section}.{key}"))?;
                let value = scalar(&value)
                    .ok_or_else(|| format!("{section}.{key} must be a value or a list of values"))?;
                values.insert(variable, value);
            }
        }
        Ok(Self(values))
    }

    /// The file's value for a variable.
    #[must_use]
    pub fn get(&self, variable: &str) -> Option<String> {
        self.0.get(variable).cloned()
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Sequence(items) => items
            .iter()
            .map(scalar)
            .collect::<Option<Vec<_>>>()
            .map(|items| items.join(",")),
        _ => None,
    }
}

struct Env<'a, F>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.optional(key) {
            None => Ok(default),
            Some(raw) => raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
                key,
                value: raw.clone(),
                reason: e.to_string(),
            }),
        }
    }

    fn secs(&self, key: &'static str, default: u64) -> Result<Duration, ConfigError> {
        self.parse(key, default).map(Duration::from_secs)
    }

    fn millis(&self, key: &'static str, default: u64) -> Result<Duration, ConfigError> {
        self.parse(key, default).map(Duration::from_millis)
    }

    fn flag(&self, key: &'static str, default: bool) -> Result<bool, ConfigError> {
        let Some(raw) = self.optional(key) else {
            return Ok(default);
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid {
                key,
                value: raw,
                reason: "expected true or false".to_string(),
            }),
        }
    }
}

fn redact_password(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let Some((credentials, host)) = rest.rsplit_once('@') else {
        return url.to_string();
    };
    match credentials.split_once(':') {
        Some((user, _)) => format!("{scheme}://{user}:***@{host}"),
        None => url.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.http.bind_address(), "0.0.0.0:8080");
        assert_eq!(config.http.static_dir, "web/static");
        assert_eq!(config.http.request_timeout, Duration::from_secs(10));
        assert_eq!(config.http.shutdown_timeout, Duration::from_secs(30));
        let options = config.database.connect_options().unwrap();
        assert_eq!(options.get_host(), "localhost");
        assert_eq!(options.get_port(), 5432);
        assert_eq!(options.get_username(), "user");
        assert_eq!(options.get_database(), Some("orders"));
        assert_eq!(config.database.max_connections, 25);
        assert_eq!(config.database.min_connections, 5);
        assert_eq!(config.kafka.brokers, "localhost:9092");
        assert_eq!(config.kafka.topic, "orders");
        assert_eq!(config.kafka.group_id, "orders-service-group");
        assert_eq!(config.kafka.min_bytes, 10_000);
        assert_eq!(config.kafka.max_bytes, 10_000_000);
        assert_eq!(config.kafka.auto_offset_reset, "earliest");
        assert_eq!(config.kafka.fetch_timeout, Duration::from_secs(1));
        assert_eq!(config.cache.restore_timeout, Duration::from_secs(10));
        assert!(!config.ingest.dead_letter);
        assert_eq!(config.ingest.retry_delay, Duration::from_secs(1));
        assert!(config.metrics.enabled);
    }

    #[test]
    fn overrides_are_applied() {
        let config = config_from(&[
            ("HTTP_PORT", "9000"),
            ("DB_HOST", "db"),
            ("DB_NAME", "shop"),
            ("KAFKA_BROKERS", "k1:9092,k2:9092"),
            ("KAFKA_FETCH_TIMEOUT_MS", "250"),
            ("CACHE_RESTORE_TIMEOUT", "3"),
            ("INGEST_DEAD_LETTER", "true"),
            ("METRICS_ENABLED", "0"),
        ])
        .unwrap();

        assert_eq!(config.http.port, 9000);
        let options = config.database.connect_options().unwrap();
        assert_eq!(options.get_host(), "db");
        assert_eq!(options.get_database(), Some("shop"));
        assert_eq!(config.kafka.brokers, "k1:9092,k2:9092");
        assert_eq!(config.kafka.fetch_timeout, Duration::from_millis(250));
        assert_eq!(config.cache.restore_timeout, Duration::from_secs(3));
        assert!(config.ingest.dead_letter);
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn database_url_wins_over_parts() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://app:secret@pg:5433/orders"),
            ("DB_HOST", "ignored"),
        ])
        .unwrap();

        let options = config.database.connect_options().unwrap();
        assert_eq!(options.get_host(), "pg");
        assert_eq!(options.get_port(), 5433);
        assert_eq!(options.get_username(), "app");
        assert_eq!(
            config.database.redacted_url(),
            "postgres://app:***@pg:5433/orders"
        );
    }

    #[test]
    fn credentials_with_url_delimiters_keep_host_and_user_intact() {
        let config = config_from(&[
            ("DB_HOST", "db"),
            ("DB_USERNAME", "app:admin"),
            ("DB_PASSWORD", "p@ss/w:rd#1"),
        ])
        .unwrap();

        let options = config.database.connect_options().unwrap();
        assert_eq!(options.get_host(), "db");
        assert_eq!(options.get_port(), 5432);
        assert_eq!(options.get_username(), "app:admin");
        assert_eq!(options.get_database(), Some("orders"));
        assert_eq!(
            config.database.redacted_url(),
            "postgres://app:admin:***@db:5432/orders"
        );
    }

    #[test]
    fn malformed_database_url_is_an_error() {
        let err = config_from(&[("DATABASE_URL", "not a url")]).unwrap_err();

        assert!(matches!(err, ConfigError::Invalid { key: "DATABASE_URL", .. }));
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = config_from(&[("HTTP_PORT", "  "), ("KAFKA_TOPIC", "")]).unwrap();

        assert_eq!(config.http.port, 8080);
        assert_eq!(config.kafka.topic, "orders");
    }

    #[test]
    fn malformed_number_is_an_error() {
        let err = config_from(&[("HTTP_PORT", "eighty")]).unwrap_err();

        assert!(matches!(
            err,
            ConfigError::Invalid { key: "HTTP_PORT", ref value, .. } if value == "eighty"
        ));
    }

    #[test]
    fn out_of_range_port_is_an_error() {
        assert!(config_from(&[("DB_PORT", "70000")]).is_err());
    }

    #[test]
    fn malformed_flag_is_an_error() {
        let err = config_from(&[("METRICS_ENABLED", "maybe")]).unwrap_err();

        assert!(err.to_string().contains("METRICS_ENABLED"));
    }

    const FILE: &str = "
http:
  port: 9090
database:
  host: db
  max_connections: 40
kafka:
  brokers: [k1:9092, k2:9092]
  topic: file-orders
metrics:
  enabled: false
";

    #[test]
    fn file_values_fill_in_settings() {
        let file = FileValues::from_yaml_str(FILE).unwrap();
        let config = Config::from_sources(|_| None, &file).unwrap();

        assert_eq!(config.http.port, 9090);
        assert_eq!(config.database.host, "db");
        assert_eq!(config.database.max_connections, 40);
        assert_eq!(config.kafka.brokers, "k1:9092,k2:9092");
        assert_eq!(config.kafka.topic, "file-orders");
        assert!(!config.metrics.enabled);
        assert_eq!(config.database.name, "orders");
    }

    #[test]
    fn variables_override_file_values() {
        let file = FileValues::from_yaml_str(FILE).unwrap();
        let config = Config::from_sources(
            |key| match key {
                "HTTP_PORT" => Some("7000".to_string()),
                "KAFKA_TOPIC" => Some("  ".to_string()),
                _ => None,
            },
            &file,
        )
        .unwrap();

        assert_eq!(config.http.port, 7000);
        assert_eq!(config.kafka.topic, "file-orders");
    }

    #[test]
    fn unknown_file_setting_is_rejected() {
        let err = FileValues::from_yaml_str("database:\n  hostname: db\n").unwrap_err();

        assert!(err.contains("database.hostname"));
    }

    #[test]
    fn nested_mapping_value_is_rejected() {
        assert!(FileValues::from_yaml_str("http:\n  port:\n    value: 1\n").is_err());
    }

    #[test]
    fn empty_file_has_no_values() {
        assert_eq!(FileValues::from_yaml_str("").unwrap(), FileValues::default());
    }

    #[test]
    fn missing_default_file_is_skipped() {
        let path = Path::new("definitely/not/here/config.yaml");

        assert_eq!(
            FileValues::from_yaml_file_if_exists(path).unwrap(),
            FileValues::default()
        );
        assert!(matches!(
            FileValues::from_yaml_file(path),
            Err(ConfigError::File { .. })
        ));
    }

    #[test]
    fn every_file_key_maps_to_a_distinct_variable() {
        let mut variables: Vec<_> = FILE_KEYS.iter().map(|(_, _, v)| *v).collect();
        variables.sort_unstable();
        variables.dedup();
        assert_eq!(variables.len(), FILE_KEYS.len());
    }

    #[test]
    fn redaction_leaves_passwordless_urls_alone() {
        assert_eq!(
            redact_password("postgres://pg:5432/orders"),
            "postgres://pg:5432/orders"
        );
        assert_eq!(
            redact_password("postgres://app@pg:5432/orders"),
            "postgres://app@pg:5432/orders"
        );
    }
}
