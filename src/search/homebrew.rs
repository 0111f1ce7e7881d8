use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::http::HttpClient;
use super::scoring::{formula_score, FORMULA_MAX_RESULTS};
use super::{sort_by_relevance, SearchBackend, SearchResult};
use crate::managers::ManagerKind;

pub const FORMULAE_URL: &str = "https://formulae.brew.sh/api/formula.json";
pub const FORMULAE_CACHE_FILE: &str = "brew_formulae_v2.json";
const FORMULAE_CACHE_VERSION: u32 = 2;

/// The subset of a Homebrew formula used for search
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Formula {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub desc: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub versions: FormulaVersions,
    #[serde(default)]
    pub homepage: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormulaVersions {
    #[serde(default)]
    pub stable: Option<String>,
}

/// On-disk formulae dump
#[derive(Debug, Serialize, Deserialize)]
struct FormulaeCacheFile {
    formulae: Vec<Formula>,
    /// Unix seconds when the dump was downloaded
    timestamp: i64,
    version: u32,
}

/// Searches the Homebrew formulae dump locally
pub struct HomebrewBackend {
    http: Arc<dyn HttpClient>,
    url: String,
    cache_dir: Option<PathBuf>,
    ttl: Duration,
    download_timeout: Duration,
    loaded: Mutex<Option<(Instant, Arc<Vec<Formula>>)>>,
}

impl HomebrewBackend {
    pub fn new(http: Arc<dyn HttpClient>, cache_dir: Option<PathBuf>) -> Self {
        Self {
            http,
            url: FORMULAE_URL.to_string(),
            cache_dir,
            ttl: Duration::from_secs(7200),
            download_timeout: Duration::from_secs(25),
            loaded: Mutex::new(None),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }

    fn cache_path(&self) -> Option<PathBuf> {
        self.cache_dir
            .as_ref()
            .map(|dir| dir.join(FORMULAE_CACHE_FILE))
    }

    async fn formulae(&self) -> Result<Arc<Vec<Formula>>> {
        let mut loaded = self.loaded.lock().await;
        if let Some((at, formulae)) = loaded.as_ref() {
            if at.elapsed() < self.ttl {
                return Ok(formulae.clone());
            }
        }

        let formulae = match self.read_disk_cache().await {
            Some(formulae) => formulae,
            None => {
                let formulae = self.download().await?;
                if let Err(e) = self.write_disk_cache(&formulae).await {
                    warn!("Could not cache Homebrew formulae: {:#}", e);
                }
                formulae
            }
        };

        let formulae = Arc::new(formulae);
        *loaded = Some((Instant::now(), formulae.clone()));
        Ok(formulae)
    }

    async fn read_disk_cache(&self) -> Option<Vec<Formula>> {
        let path = self.cache_path()?;
        let contents = tokio::fs::read_to_string(&path).await.ok()?;

        let cached: FormulaeCacheFile = match serde_json::from_str(&contents) {
            Ok(cached) => cached,
            Err(e) => {
                debug!("Ignoring corrupt formulae cache {}: {}", path.display(), e);
                return None;
            }
        };

        let age = Utc::now().timestamp().saturating_sub(cached.timestamp);
        if cached.version != FORMULAE_CACHE_VERSION
            || age < 0
            || age as u64 >= self.ttl.as_secs()
            || cached.formulae.is_empty()
        {
            return None;
        }

        debug!("Using cached Homebrew formulae ({}s old)", age);
        Some(cached.formulae)
    }

    async fn write_disk_cache(&self, formulae: &[Formula]) -> Result<()> {
        let Some(path) = self.cache_path() else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create cache directory: {}", parent.display()))?;
        }

        let file = FormulaeCacheFile {
            formulae: formulae.to_vec(),
            timestamp: Utc::now().timestamp(),
            version: FORMULAE_CACHE_VERSION,
        };
        let json = serde_json::to_string(&file).context("Failed to serialize formulae")?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    async fn download(&self) -> Result<Vec<Formula>> {
        debug!("Downloading Homebrew formulae from {}", self.url);
        let response = self
            .http
            .get_json(&self.url, &[], self.download_timeout)
            .await?;

        if !response.is_success() {
            bail!("Homebrew formulae API returned HTTP {}", response.status);
        }

        serde_json::from_value(response.body).context("Unexpected Homebrew formulae format")
    }
}

/// Score every formula against `query` and keep the best matches
pub fn search_formulae(formulae: &[Formula], query: &str) -> Vec<SearchResult> {
    let mut results: Vec<SearchResult> = formulae
        .iter()
        .filter_map(|formula| {
            let description = formula.desc.as_deref().unwrap_or("");
            let score = formula_score(&formula.name, &formula.aliases, description, query)?;
            let mut result =
                SearchResult::new(&formula.name, description, ManagerKind::Brew, score);
            if let Some(stable) = &formula.versions.stable {
                result.version = stable.clone();
            }
            result.homepage = formula.homepage.clone();
            Some(result)
        })
        .collect();

    sort_by_relevance(&mut results);
    results.truncate(FORMULA_MAX_RESULTS);
    results
}

#[async_trait]
impl SearchBackend for HomebrewBackend {
    fn manager(&self) -> ManagerKind {
        ManagerKind::Brew
    }

    fn timeout(&self) -> Duration {
        self.download_timeout + Duration::from_secs(5)
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        let formulae = self.formulae().await?;
        Ok(search_formulae(&formulae, query))
    }
}
