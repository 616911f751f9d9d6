//! Engine configuration loading
//!
//! Loads configuration from `~/.config/finz/finz.toml` (or `FINZ_CONFIG` env).
//! A missing file is not an error; every field has a default.

use crate::errors::{FinzError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Upper bound on rows per conditional batch write.
pub const MAX_BATCH_SIZE: usize = 100;

/// Root configuration for the materialization engine
#[derive(Debug, Deserialize, Clone)]
pub struct FinzConfig {
    /// Path to the SQLite plan store
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Taxonomy source settings
    #[serde(default)]
    pub taxonomy: TaxonomyConfig,

    /// Materializer write settings
    #[serde(default)]
    pub materialize: MaterializeConfig,

    /// Forecast grid settings
    #[serde(default)]
    pub forecast: ForecastConfig,

    /// Store connection settings
    #[serde(default)]
    pub store: StoreConfig,
}

fn default_db_path() -> String {
    dirs::home_dir()
        .map(|h| {
            h.join(".config")
                .join("finz")
                .join("finz.db")
                .to_string_lossy()
                .into_owned()
        })
        .unwrap_or_else(|| "finz.db".to_string())
}

/// Taxonomy configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct TaxonomyConfig {
    /// Optional curated taxonomy TOML; the embedded table is used when unset
    #[serde(default)]
    pub path: Option<String>,
}

/// Materializer configuration
#[derive(Debug, Deserialize, Clone)]
pub struct MaterializeConfig {
    /// Rows per conditional batch write
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Retries for the failed subset of a batch
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First backoff between retries
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Backoff ceiling
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_batch_size() -> usize {
    25
}
fn default_max_retries() -> u32 {
    3
}
fn default_initial_backoff_ms() -> u64 {
    20
}
fn default_max_backoff_ms() -> u64 {
    500
}

impl Default for MaterializeConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Forecast grid configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ForecastConfig {
    /// Drop cells whose planned, forecast and actual are all zero
    #[serde(default = "default_omit_zero_rows")]
    pub omit_zero_rows: bool,
}

fn default_omit_zero_rows() -> bool {
    true
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            omit_zero_rows: default_omit_zero_rows(),
        }
    }
}

/// Store connection configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// How long a writer waits on a locked database before failing
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl Default for FinzConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            taxonomy: TaxonomyConfig::default(),
            materialize: MaterializeConfig::default(),
            forecast: ForecastConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl FinzConfig {
    /// Environment variable for config path override
    pub const ENV_CONFIG_PATH: &'static str = "FINZ_CONFIG";

    /// Default config filename
    pub const DEFAULT_CONFIG_FILENAME: &'static str = "finz.toml";

    /// Load configuration from file
    ///
    /// Resolution order:
    /// 1. `FINZ_CONFIG` environment variable
    /// 2. `~/.config/finz/finz.toml`
    ///
    /// If the config file doesn't exist, returns default configuration.
    pub fn load() -> Result<Self> {
        let path = Self::resolve_config_path();

        if !path.exists() {
            tracing::info!(
                path = %path.display(),
                "finz config not found, using defaults"
            );
            return Ok(Self::default());
        }

        Self::load_from_path(&path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            FinzError::config_with_source(format!("failed to read config at {}", path.display()), e)
        })?;

        Self::parse(&contents)
    }

    /// Parse configuration from TOML string
    pub fn parse(contents: &str) -> Result<Self> {
        let cfg: FinzConfig = toml::from_str(contents)
            .map_err(|e| FinzError::config_with_source("failed to parse config", e))?;

        cfg.validate()?;
        Ok(cfg)
    }

    fn resolve_config_path() -> PathBuf {
        if let Ok(path) = std::env::var(Self::ENV_CONFIG_PATH) {
            return PathBuf::from(path);
        }

        dirs::home_dir()
            .map(|h| {
                h.join(".config")
                    .join("finz")
                    .join(Self::DEFAULT_CONFIG_FILENAME)
            })
            .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_CONFIG_FILENAME))
    }

    fn validate(&self) -> Result<()> {
        let batch = self.materialize.batch_size;
        if batch == 0 || batch > MAX_BATCH_SIZE {
            return Err(FinzError::config(format!(
                "materialize.batch_size must be between 1 and {MAX_BATCH_SIZE}, got {batch}"
            )));
        }

        if self.materialize.initial_backoff_ms > self.materialize.max_backoff_ms {
            tracing::warn!(
                initial = self.materialize.initial_backoff_ms,
                max = self.materialize.max_backoff_ms,
                "initial backoff exceeds max backoff; retries will use the max"
            );
        }

        if self.materialize.max_retries == 0 {
            tracing::warn!("materialize.max_retries is 0; failed batch items will not be retried");
        }

        if self.store.busy_timeout_ms == 0 {
            tracing::warn!(
                "store.busy_timeout_ms is 0; concurrent writers may fail with SQLITE_BUSY"
            );
        }

        Ok(())
    }

    /// Get the resolved database path (expanding ~ if needed)
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_home(&self.db_path)
    }

    /// Get the resolved taxonomy path, if an external table is configured
    pub fn resolved_taxonomy_path(&self) -> Option<PathBuf> {
        self.taxonomy.path.as_deref().map(expand_home)
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(stripped);
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = FinzConfig::default();
        assert_eq!(cfg.materialize.batch_size, 25);
        assert_eq!(cfg.materialize.max_retries, 3);
        assert!(cfg.forecast.omit_zero_rows);
        assert!(cfg.taxonomy.path.is_none());
    }

    #[test]
    fn test_parse_minimal_config() {
        let toml = r#"
            db_path = "/tmp/finz-test.db"
        "#;

        let cfg = FinzConfig::parse(toml).expect("should parse");
        assert_eq!(cfg.db_path, "/tmp/finz-test.db");
        assert_eq!(cfg.resolved_db_path(), PathBuf::from("/tmp/finz-test.db"));
        // Defaults should be applied
        assert_eq!(cfg.materialize.batch_size, 25);
        assert_eq!(cfg.store.busy_timeout_ms, 5_000);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            db_path = "~/.config/finz/other.db"

            [taxonomy]
            path = "/etc/finz/taxonomy.toml"

            [materialize]
            batch_size = 10
            max_retries = 5
            initial_backoff_ms = 0
            max_backoff_ms = 100

            [forecast]
            omit_zero_rows = false

            [store]
            busy_timeout_ms = 250
        "#;

        let cfg = FinzConfig::parse(toml).expect("should parse");
        assert_eq!(cfg.materialize.batch_size, 10);
        assert_eq!(cfg.materialize.max_retries, 5);
        assert!(!cfg.forecast.omit_zero_rows);
        assert_eq!(cfg.store.busy_timeout_ms, 250);
        assert_eq!(
            cfg.resolved_taxonomy_path(),
            Some(PathBuf::from("/etc/finz/taxonomy.toml"))
        );
    }

    #[test]
    fn test_rejects_oversized_batch() {
        let toml = r#"
            [materialize]
            batch_size = 500
        "#;

        let err = FinzConfig::parse(toml).expect_err("batch too large");
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn test_rejects_zero_batch() {
        let toml = r#"
            [materialize]
            batch_size = 0
        "#;

        assert!(FinzConfig::parse(toml).is_err());
    }
}
