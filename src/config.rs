//! Configuration management for the exodus edge handlers

use crate::error::{EdgeError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Environment variable naming the configuration file
pub const CONF_FILE_ENV: &str = "EXODUS_LAMBDA_CONF_FILE";

/// Environment variable overriding the AWS endpoint (e.g. localstack)
pub const ENDPOINT_URL_ENV: &str = "EXODUS_AWS_ENDPOINT_URL";

/// Region used for any table without explicit region configuration
pub const DEFAULT_REGION: &str = "us-east-1";

/// Longest accepted definitions cache TTL, in minutes (one week)
pub const MAX_CONFIG_CACHE_TTL: u64 = 7 * 24 * 60;

/// Longest accepted table client timeout, in seconds
pub const MAX_TIMEOUT_SECS: f64 = 3600.0;

/// Configuration for the edge handlers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeConfig {
    /// Table holding content items, keyed by web_uri
    pub table: TableConfig,

    /// Table holding the versioned CDN definitions, keyed by config_id
    pub config_table: TableConfig,

    /// Definitions cache TTL in minutes (default: 2)
    #[serde(default = "default_config_cache_ttl")]
    pub config_cache_ttl: u64,

    /// Response header settings
    #[serde(default)]
    pub headers: HeadersConfig,

    /// File name of synthesized directory indexes
    #[serde(default = "default_index")]
    pub index: String,

    /// Whether to fall back to mirrored (releasever-unaliased) paths
    #[serde(default = "default_true", deserialize_with = "deserialize_flag")]
    pub mirror_reads: bool,

    /// Version string stamped on diagnostic responses
    #[serde(default = "default_lambda_version")]
    pub lambda_version: String,

    /// Table client connect timeout in seconds
    #[serde(default)]
    pub connect_timeout: Option<f64>,

    /// Table client read timeout in seconds
    #[serde(default)]
    pub read_timeout: Option<f64>,

    /// Endpoint override for the table service
    #[serde(default)]
    pub endpoint_url: Option<String>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// A table name and the regions in which it may be queried, in failover order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableConfig {
    pub name: String,

    #[serde(default)]
    pub available_regions: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HeadersConfig {
    /// max-age applied to whitelisted URIs (default: 600)
    #[serde(default = "default_max_age")]
    pub max_age: u64,

    /// Response header name prefixes removed before responses leave the edge
    #[serde(default = "default_strip_prefixes")]
    pub strip_prefixes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Default level filter, overridden by RUST_LOG
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit one JSON object per event
    #[serde(default = "default_true")]
    pub json: bool,
}

impl Default for HeadersConfig {
    fn default() -> Self {
        HeadersConfig {
            max_age: default_max_age(),
            strip_prefixes: default_strip_prefixes(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            json: default_true(),
        }
    }
}

// Default value functions for serde
fn default_config_cache_ttl() -> u64 {
    2
}

fn default_index() -> String {
    ".__exodus_autoindex".to_string()
}

fn default_true() -> bool {
    true
}

fn default_lambda_version() -> String {
    "unknown".to_string()
}

fn default_max_age() -> u64 {
    600
}

fn default_strip_prefixes() -> Vec<String> {
    vec![
        "x-amz-meta-".to_string(),
        "x-amz-replication-status".to_string(),
        "x-amz-server-side-encryption".to_string(),
        "x-amz-version-id".to_string(),
    ]
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Accepts booleans, integers and "true"/"false"/"1"/"0" strings
fn deserialize_flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
        Str(String),
    }

    match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => Ok(b),
        Flag::Int(i) => Ok(i != 0),
        Flag::Str(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" | "" => Ok(false),
            other => Err(serde::de::Error::custom(format!(
                "invalid boolean flag '{}'",
                other
            ))),
        },
    }
}

impl Default for EdgeConfig {
    fn default() -> Self {
        EdgeConfig {
            table: TableConfig {
                name: "exodus-cdn".to_string(),
                available_regions: None,
            },
            config_table: TableConfig {
                name: "exodus-config".to_string(),
                available_regions: None,
            },
            config_cache_ttl: default_config_cache_ttl(),
            headers: HeadersConfig::default(),
            index: default_index(),
            mirror_reads: default_true(),
            lambda_version: default_lambda_version(),
            connect_timeout: None,
            read_timeout: None,
            endpoint_url: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl EdgeConfig {
    /// Load configuration from a YAML (or JSON) file
    ///
    /// # Returns
    /// * `Ok(EdgeConfig)` if loading and validation succeed
    /// * `Err(EdgeError)` if file cannot be read or config is invalid
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            EdgeError::Config(format!("Failed to read config file: {}", e))
        })?;

        Self::from_yaml_str(&content)
    }

    /// Parse and validate configuration text
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: EdgeConfig = serde_yaml::from_str(content).map_err(|e| {
            EdgeError::Config(format!("Failed to parse config file: {}", e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the file named by `EXODUS_LAMBDA_CONF_FILE`
    /// (default `lambda_config.yaml`), honouring `EXODUS_AWS_ENDPOINT_URL`.
    pub fn from_env() -> Result<Self> {
        let path = env::var(CONF_FILE_ENV)
            .ok()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| "lambda_config.yaml".to_string());

        let mut config = Self::from_file(&path)?;
        if let Some(endpoint) = env::var(ENDPOINT_URL_ENV).ok().filter(|e| !e.is_empty()) {
            config.endpoint_url = Some(endpoint);
        }
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// # Validation Rules
    /// - table names must not be empty
    /// - region lists, when given, must not be empty
    /// - config_cache_ttl must be > 0
    /// - index must be a plain file name
    /// - timeouts must be positive
    pub fn validate(&self) -> Result<()> {
        for (field, table) in [("table", &self.table), ("config_table", &self.config_table)] {
            if table.name.is_empty() {
                return Err(EdgeError::Config(format!("{}.name must not be empty", field)));
            }
            if let Some(regions) = &table.available_regions {
                if regions.is_empty() || regions.iter().any(|r| r.is_empty()) {
                    return Err(EdgeError::Config(format!(
                        "{}.available_regions must list at least one non-empty region",
                        field
                    )));
                }
            }
        }

        if self.config_cache_ttl == 0 || self.config_cache_ttl > MAX_CONFIG_CACHE_TTL {
            return Err(EdgeError::Config(format!(
                "config_cache_ttl must be between 1 and {} minutes, got {}",
                MAX_CONFIG_CACHE_TTL, self.config_cache_ttl
            )));
        }

        if self.index.is_empty() || self.index.contains('/') {
            return Err(EdgeError::Config(format!(
                "index must be a non-empty file name, got '{}'",
                self.index
            )));
        }

        for (field, timeout) in [
            ("connect_timeout", self.connect_timeout),
            ("read_timeout", self.read_timeout),
        ] {
            if let Some(t) = timeout {
                if !(t.is_finite() && t > 0.0 && t <= MAX_TIMEOUT_SECS) {
                    return Err(EdgeError::Config(format!(
                        "{} must be a positive number of seconds up to {}, got {}",
                        field, MAX_TIMEOUT_SECS, t
                    )));
                }
            }
        }

        Ok(())
    }

    /// Regions in which `table_name` should be queried, in failover order.
    ///
    /// Unknown tables fall back to [`DEFAULT_REGION`].
    pub fn regions_for(&self, table_name: &str) -> Vec<String> {
        let configured = [&self.table, &self.config_table]
            .into_iter()
            .find(|t| t.name == table_name)
            .and_then(|t| t.available_regions.clone())
            .filter(|r| !r.is_empty());

        match configured {
            Some(regions) => regions,
            None => {
                warn!("No config for {}, applying default regions", table_name);
                vec![DEFAULT_REGION.to_string()]
            }
        }
    }

    /// Definitions cache TTL as a duration
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.config_cache_ttl.saturating_mul(60))
    }

    /// Connect timeout; values no `Duration` can hold are ignored
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout.and_then(|t| Duration::try_from_secs_f64(t).ok())
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout.and_then(|t| Duration::try_from_secs_f64(t).ok())
    }
}
