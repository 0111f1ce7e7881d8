//! Concurrent search across package registries and manager CLIs

pub mod cache;
pub mod cli;
pub mod homebrew;
pub mod http;
pub mod npm;
pub mod pypi;
pub mod scoring;

pub use cache::SearchCache;
pub use cli::{parse_cli_output, CliSearchBackend};
pub use homebrew::HomebrewBackend;
pub use http::{HttpClient, HttpResponse, ReqwestHttpClient};
pub use npm::NpmBackend;
pub use pypi::PypiBackend;

use anyhow::Result;
use async_trait::async_trait;
use futures_util::FutureExt;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::batch::{NoopProgress, ProgressSink};
use crate::config::SearchConfig;
use crate::error::truncate_message;
use crate::managers::{Detect, ManagerKind, REGISTRY};
use crate::utils::{serialize_secs, CommandRunner, Platform};

/// Longest description kept in a result
pub const MAX_DESCRIPTION_CHARS: usize = 200;

/// Placeholder for results without a known version
pub const UNKNOWN_VERSION: &str = "unknown";

/// One package hit from one manager
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub name: String,
    pub description: String,
    pub version: String,
    pub manager: ManagerKind,
    pub homepage: Option<String>,
    pub relevance_score: f64,
}

impl SearchResult {
    pub fn new(
        name: impl Into<String>,
        description: &str,
        manager: ManagerKind,
        relevance_score: f64,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.trim().chars().take(MAX_DESCRIPTION_CHARS).collect(),
            version: UNKNOWN_VERSION.to_string(),
            manager,
            homepage: None,
            relevance_score,
        }
    }
}

/// Stable sort, most relevant first
pub fn sort_by_relevance(results: &mut [SearchResult]) {
    results.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
}

/// Search strategy for one manager
#[async_trait]
pub trait SearchBackend: Send + Sync {
    fn manager(&self) -> ManagerKind;

    /// Upper bound for one `search` call
    fn timeout(&self) -> Duration;

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>>;
}

/// Fixed mapping from manager to its search backend
#[derive(Default, Clone)]
pub struct BackendRegistry {
    backends: HashMap<ManagerKind, Arc<dyn SearchBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard backends: registry APIs for pip, npm and brew, native
    /// search commands for every other manager
    pub fn with_defaults(
        http: Arc<dyn HttpClient>,
        runner: Arc<dyn CommandRunner>,
        config: &SearchConfig,
        cache_dir: Option<PathBuf>,
        platform: Platform,
    ) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(PypiBackend::new(http.clone())));
        registry.register(Arc::new(NpmBackend::new(http.clone())));
        registry.register(Arc::new(
            HomebrewBackend::new(http, cache_dir)
                .with_ttl(Duration::from_secs(config.formulae_cache_ttl_secs))
                .with_download_timeout(Duration::from_secs(config.formulae_timeout_secs)),
        ));

        let cli_timeout = Duration::from_secs(config.cli_timeout_secs);
        for descriptor in REGISTRY.iter().filter(|d| d.search.is_some()) {
            registry.register(Arc::new(CliSearchBackend::new(
                descriptor.kind,
                runner.clone(),
                platform,
                cli_timeout,
            )));
        }
        registry
    }

    /// Add or replace the backend for its manager
    pub fn register(&mut self, backend: Arc<dyn SearchBackend>) {
        self.backends.insert(backend.manager(), backend);
    }

    pub fn get(&self, manager: ManagerKind) -> Option<Arc<dyn SearchBackend>> {
        self.backends.get(&manager).cloned()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

/// How one backend fared, for diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct BackendStatus {
    pub manager: ManagerKind,
    pub ok: bool,
    pub results: usize,
    pub error: Option<String>,
    #[serde(serialize_with = "serialize_secs")]
    pub duration: Duration,
}

/// Results of one search plus per-backend diagnostics
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchOutcome {
    pub results: Vec<SearchResult>,
    pub from_cache: bool,
    pub backends: Vec<BackendStatus>,
}

impl SearchOutcome {
    pub fn succeeded_backends(&self) -> usize {
        self.backends.iter().filter(|status| status.ok).count()
    }

    pub fn failed_backends(&self) -> usize {
        self.backends.len() - self.succeeded_backends()
    }
}

/// Fan-out limits
#[derive(Debug, Clone, Copy)]
pub struct SearchOptions {
    /// Backends still running after this are abandoned
    pub timeout: Duration,
    pub max_concurrent: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self::from_config(&SearchConfig::default())
    }
}

impl SearchOptions {
    pub fn from_config(config: &SearchConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs),
            max_concurrent: config.max_concurrent_backends,
        }
    }
}

/// Fans a query out to the backends of every present manager
pub struct SearchAggregator {
    backends: BackendRegistry,
    detector: Arc<dyn Detect>,
    cache: Arc<SearchCache>,
    options: SearchOptions,
    progress: Arc<dyn ProgressSink>,
}

impl SearchAggregator {
    pub fn new(
        backends: BackendRegistry,
        detector: Arc<dyn Detect>,
        cache: Arc<SearchCache>,
        options: SearchOptions,
    ) -> Self {
        Self {
            backends,
            detector,
            cache,
            options,
            progress: Arc::new(NoopProgress),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn cache(&self) -> &Arc<SearchCache> {
        &self.cache
    }

    /// Search `query`, most relevant first, at most `limit` results.
    ///
    /// Backend failures and timeouts only show up in `backends`; the call
    /// itself never fails.
    pub async fn search(
        &self,
        query: &str,
        manager: Option<ManagerKind>,
        limit: usize,
    ) -> SearchOutcome {
        let query = query.trim();
        if query.is_empty() {
            return SearchOutcome::default();
        }

        let key = SearchCache::key(query, manager, limit);
        if let Some(results) = self.cache.get(&key) {
            info!("Using cached results for '{}'", query);
            return SearchOutcome {
                results,
                from_cache: true,
                backends: Vec::new(),
            };
        }

        let detection = self.detector.detect().await;
        let targets: Vec<ManagerKind> = match manager {
            Some(kind) if detection.is_present(kind) => vec![kind],
            Some(_) => Vec::new(),
            None => detection.present(),
        };
        let targets: Vec<(ManagerKind, Arc<dyn SearchBackend>)> = targets
            .into_iter()
            .filter_map(|kind| match self.backends.get(kind) {
                Some(backend) => Some((kind, backend)),
                None => {
                    debug!("No search backend registered for {}", kind);
                    None
                }
            })
            .collect();

        if targets.is_empty() {
            warn!("No usable package managers available for searching");
            return SearchOutcome::default();
        }

        info!(
            "Searching for '{}' across {} repositories",
            query,
            targets.len()
        );

        let (mut results, backends) = self.fan_out(query, targets).await;

        sort_by_relevance(&mut results);
        results.truncate(limit);
        self.cache.insert(key, results.clone());

        SearchOutcome {
            results,
            from_cache: false,
            backends,
        }
    }

    async fn fan_out(
        &self,
        query: &str,
        targets: Vec<(ManagerKind, Arc<dyn SearchBackend>)>,
    ) -> (Vec<SearchResult>, Vec<BackendStatus>) {
        let permits = self.options.max_concurrent.clamp(1, targets.len());
        let semaphore = Arc::new(Semaphore::new(permits));
        let mut pending: BTreeSet<ManagerKind> = targets.iter().map(|(kind, _)| *kind).collect();
        let mut tasks = JoinSet::new();

        self.progress
            .start(targets.len() as u64, "Searching repositories");

        for (kind, backend) in targets {
            let semaphore = semaphore.clone();
            let query = query.to_string();
            tasks.spawn(async move {
                // The semaphore is never closed
                let _permit = semaphore.acquire_owned().await.ok();
                let started = Instant::now();
                let outcome = AssertUnwindSafe(tokio::time::timeout(
                    backend.timeout(),
                    backend.search(&query),
                ))
                .catch_unwind()
                .await;
                (kind, outcome, started.elapsed())
            });
        }

        let deadline = tokio::time::Instant::now() + self.options.timeout;
        let mut results = Vec::new();
        let mut statuses = Vec::new();

        loop {
            let joined = match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(joined)) => joined,
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        "Search timed out after {}s, abandoning: {}",
                        self.options.timeout.as_secs(),
                        pending
                            .iter()
                            .map(ManagerKind::as_str)
                            .collect::<Vec<_>>()
                            .join(", ")
                    );
                    tasks.abort_all();
                    break;
                }
            };

            let Ok((kind, outcome, duration)) = joined else {
                // Tasks are never aborted before this point
                continue;
            };
            pending.remove(&kind);

            let status = match outcome {
                Ok(Ok(Ok(found))) => {
                    info!("{}: {} results", kind.as_str().to_uppercase(), found.len());
                    let count = found.len();
                    results.extend(found);
                    BackendStatus {
                        manager: kind,
                        ok: true,
                        results: count,
                        error: None,
                        duration,
                    }
                }
                Ok(Ok(Err(e))) => failed_status(kind, format!("{e:#}"), duration),
                Ok(Err(_)) => failed_status(kind, "Search timed out".to_string(), duration),
                Err(_) => failed_status(kind, "Search backend panicked".to_string(), duration),
            };
            self.progress.update(1, kind.as_str());
            statuses.push(status);
        }

        for kind in pending {
            statuses.push(failed_status(
                kind,
                "Abandoned at search deadline".to_string(),
                self.options.timeout,
            ));
        }

        self.progress.finish();
        (results, statuses)
    }
}

fn failed_status(manager: ManagerKind, error: String, duration: Duration) -> BackendStatus {
    warn!(
        "{}: Search failed - {}",
        manager.as_str().to_uppercase(),
        truncate_message(&error, 50)
    );
    BackendStatus {
        manager,
        ok: false,
        results: 0,
        error: Some(truncate_message(&error, 200)),
        duration,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::managers::DetectionMap;

    struct Fixed {
        manager: ManagerKind,
        results: Vec<(&'static str, f64)>,
    }

    #[async_trait]
    impl SearchBackend for Fixed {
        fn manager(&self) -> ManagerKind {
            self.manager
        }

        fn timeout(&self) -> Duration {
            Duration::from_secs(5)
        }

        async fn search(&self, _query: &str) -> Result<Vec<SearchResult>> {
            Ok(self
                .results
                .iter()
                .map(|(name, score)| SearchResult::new(*name, "", self.manager, *score))
                .collect())
        }
    }

    struct Broken;

    #[async_trait]
    impl SearchBackend for Broken {
        fn manager(&self) -> ManagerKind {
            ManagerKind::Snap
        }

        fn timeout(&self) -> Duration {
            Duration::from_secs(5)
        }

        async fn search(&self, _query: &str) -> Result<Vec<SearchResult>> {
            anyhow::bail!("snapd is not running")
        }
    }

    fn aggregator(backends: Vec<Arc<dyn SearchBackend>>, present: &[ManagerKind]) -> SearchAggregator {
        let mut registry = BackendRegistry::new();
        for backend in backends {
            registry.register(backend);
        }
        SearchAggregator::new(
            registry,
            Arc::new(DetectionMap::from_present(present.iter().copied())),
            Arc::new(SearchCache::default()),
            SearchOptions::default(),
        )
    }

    #[test]
    fn test_description_truncated() {
        let long = "d".repeat(500);
        let result = SearchResult::new("x", &long, ManagerKind::Apt, 1.0);
        assert_eq!(result.description.chars().count(), MAX_DESCRIPTION_CHARS);
        assert_eq!(result.version, UNKNOWN_VERSION);
    }

    #[test]
    fn test_sort_is_stable_descending() {
        let mut results = vec![
            SearchResult::new("a", "", ManagerKind::Apt, 20.0),
            SearchResult::new("b", "", ManagerKind::Pip, 95.0),
            SearchResult::new("c", "", ManagerKind::Dnf, 20.0),
        ];
        sort_by_relevance(&mut results);
        let names: Vec<&str> = results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[tokio::test]
    async fn test_failed_backend_does_not_fail_search() {
        let agg = aggregator(
            vec![
                Arc::new(Fixed {
                    manager: ManagerKind::Apt,
                    results: vec![("vim", 20.0)],
                }) as Arc<dyn SearchBackend>,
                Arc::new(Broken),
            ],
            &[ManagerKind::Apt, ManagerKind::Snap],
        );

        let outcome = agg.search("vim", None, 20).await;

        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.succeeded_backends(), 1);
        assert_eq!(outcome.failed_backends(), 1);
        let broken = outcome
            .backends
            .iter()
            .find(|s| s.manager == ManagerKind::Snap)
            .unwrap();
        assert!(broken.error.as_deref().unwrap().contains("snapd"));
    }

    #[tokio::test]
    async fn test_filter_to_absent_manager_yields_nothing() {
        let agg = aggregator(
            vec![Arc::new(Fixed {
                manager: ManagerKind::Apt,
                results: vec![("vim", 20.0)],
            }) as Arc<dyn SearchBackend>],
            &[ManagerKind::Apt],
        );

        let outcome = agg.search("vim", Some(ManagerKind::Pip), 20).await;
        assert!(outcome.results.is_empty());
        assert!(outcome.backends.is_empty());
    }

    #[tokio::test]
    async fn test_limit_truncates() {
        let agg = aggregator(
            vec![Arc::new(Fixed {
                manager: ManagerKind::Apt,
                results: vec![("a", 20.0), ("b", 20.0), ("c", 20.0)],
            }) as Arc<dyn SearchBackend>],
            &[ManagerKind::Apt],
        );

        let outcome = agg.search("x", None, 2).await;
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.results[0].name, "a");
    }

    #[tokio::test]
    async fn test_empty_query() {
        let agg = aggregator(Vec::new(), &[]);
        let outcome = agg.search("   ", None, 20).await;
        assert!(outcome.results.is_empty());
        assert!(!outcome.from_cache);
    }
}
