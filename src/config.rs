//! YAML configuration

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use crate::error::CrossfireError;
use crate::managers::{OperationKind, OperationTimeouts};

pub const CONFIG_FILE_NAME: &str = "config.yaml";
pub const APP_DIR_NAME: &str = "crossfire";

/// Directory holding the config file
pub fn get_config_dir() -> PathBuf {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
        .unwrap_or_default()
        .join(APP_DIR_NAME)
}

pub fn default_config_path() -> PathBuf {
    get_config_dir().join(CONFIG_FILE_NAME)
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR_NAME)
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(get_config_dir)
        .join(APP_DIR_NAME)
        .join("packages.db")
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_install_workers")]
    pub install_workers: usize,
    #[serde(default = "default_remove_workers")]
    pub remove_workers: usize,
    /// Whole-batch deadline for installs, in seconds
    #[serde(default = "default_install_batch_timeout")]
    pub install_timeout_secs: u64,
    #[serde(default = "default_remove_batch_timeout")]
    pub remove_timeout_secs: u64,
    #[serde(default)]
    pub fail_fast: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Per-command install timeout, in seconds
    #[serde(default = "default_install_timeout")]
    pub install_timeout_secs: u64,
    #[serde(default = "default_remove_timeout")]
    pub remove_timeout_secs: u64,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
    /// Timeout for installing a package manager itself
    #[serde(default = "default_setup_timeout")]
    pub setup_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_search_limit")]
    pub limit: usize,
    #[serde(default = "default_fanout_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_concurrent_backends")]
    pub max_concurrent_backends: usize,
    #[serde(default = "default_cache_fresh")]
    pub cache_fresh_secs: u64,
    #[serde(default = "default_cache_stale")]
    pub cache_stale_secs: u64,
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,
    #[serde(default = "default_cli_timeout")]
    pub cli_timeout_secs: u64,
    #[serde(default = "default_api_timeout")]
    pub api_timeout_secs: u64,
    #[serde(default = "default_formulae_timeout")]
    pub formulae_timeout_secs: u64,
    #[serde(default = "default_formulae_ttl")]
    pub formulae_cache_ttl_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_http_retries")]
    pub retries: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    #[serde(default = "default_pool_size")]
    pub pool_max_idle_per_host: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub database: PathBuf,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
}

fn default_install_workers() -> usize {
    4
}

fn default_remove_workers() -> usize {
    3
}

fn default_install_batch_timeout() -> u64 {
    3600
}

fn default_remove_batch_timeout() -> u64 {
    1800
}

fn default_install_timeout() -> u64 {
    1800
}

fn default_remove_timeout() -> u64 {
    600
}

fn default_probe_timeout() -> u64 {
    3
}

fn default_setup_timeout() -> u64 {
    900
}

fn default_search_limit() -> usize {
    20
}

fn default_fanout_timeout() -> u64 {
    45
}

fn default_max_concurrent_backends() -> usize {
    5
}

fn default_cache_fresh() -> u64 {
    900
}

fn default_cache_stale() -> u64 {
    1800
}

fn default_cache_max_entries() -> usize {
    50
}

fn default_cli_timeout() -> u64 {
    15
}

fn default_api_timeout() -> u64 {
    8
}

fn default_formulae_timeout() -> u64 {
    25
}

fn default_formulae_ttl() -> u64 {
    7200
}

fn default_user_agent() -> String {
    format!("crossfire/{}", env!("CARGO_PKG_VERSION"))
}

fn default_http_retries() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    300
}

fn default_pool_size() -> usize {
    10
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            install_workers: default_install_workers(),
            remove_workers: default_remove_workers(),
            install_timeout_secs: default_install_batch_timeout(),
            remove_timeout_secs: default_remove_batch_timeout(),
            fail_fast: false,
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            install_timeout_secs: default_install_timeout(),
            remove_timeout_secs: default_remove_timeout(),
            probe_timeout_secs: default_probe_timeout(),
            setup_timeout_secs: default_setup_timeout(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            limit: default_search_limit(),
            timeout_secs: default_fanout_timeout(),
            max_concurrent_backends: default_max_concurrent_backends(),
            cache_fresh_secs: default_cache_fresh(),
            cache_stale_secs: default_cache_stale(),
            cache_max_entries: default_cache_max_entries(),
            cli_timeout_secs: default_cli_timeout(),
            api_timeout_secs: default_api_timeout(),
            formulae_timeout_secs: default_formulae_timeout(),
            formulae_cache_ttl_secs: default_formulae_ttl(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            retries: default_http_retries(),
            backoff_ms: default_backoff_ms(),
            pool_max_idle_per_host: default_pool_size(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: default_db_path(),
            cache_dir: default_cache_dir(),
        }
    }
}

impl BatchConfig {
    pub fn workers_for(&self, operation: OperationKind) -> usize {
        match operation {
            OperationKind::Install => self.install_workers,
            OperationKind::Remove => self.remove_workers,
        }
    }

    pub fn timeout_for(&self, operation: OperationKind) -> Duration {
        Duration::from_secs(match operation {
            OperationKind::Install => self.install_timeout_secs,
            OperationKind::Remove => self.remove_timeout_secs,
        })
    }
}

impl ExecutionConfig {
    pub fn operation_timeouts(&self) -> OperationTimeouts {
        OperationTimeouts {
            install: Duration::from_secs(self.install_timeout_secs),
            remove: Duration::from_secs(self.remove_timeout_secs),
            setup: Duration::from_secs(self.setup_timeout_secs),
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

impl Config {
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Reject settings that would make the orchestrator unable to do any work
    pub fn validate(&self) -> Result<(), CrossfireError> {
        let checks: [(&str, bool); 6] = [
            ("batch.install_workers", self.batch.install_workers == 0),
            ("batch.remove_workers", self.batch.remove_workers == 0),
            ("search.limit", self.search.limit == 0),
            (
                "search.max_concurrent_backends",
                self.search.max_concurrent_backends == 0,
            ),
            ("search.cache_max_entries", self.search.cache_max_entries == 0),
            ("execution.probe_timeout_secs", self.execution.probe_timeout_secs == 0),
        ];

        if let Some((field, _)) = checks.iter().find(|(_, invalid)| *invalid) {
            return Err(CrossfireError::Config {
                message: format!("{field} must be greater than zero"),
            });
        }

        if self.search.cache_stale_secs < self.search.cache_fresh_secs {
            return Err(CrossfireError::Config {
                message: "search.cache_stale_secs must not be shorter than search.cache_fresh_secs"
                    .to_string(),
            });
        }

        Ok(())
    }
}
