//! Integration tests for the search aggregator

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossfire::managers::{DetectionMap, ManagerKind};
use crossfire::search::{
    BackendRegistry, SearchAggregator, SearchBackend, SearchCache, SearchOptions, SearchResult,
};

/// Returns canned hits after an optional delay and counts its calls
struct CannedBackend {
    manager: ManagerKind,
    hits: Vec<(&'static str, f64)>,
    delay: Duration,
    fail: bool,
    calls: AtomicUsize,
}

impl CannedBackend {
    fn new(manager: ManagerKind, hits: &[(&'static str, f64)]) -> Self {
        Self {
            manager,
            hits: hits.to_vec(),
            delay: Duration::ZERO,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchBackend for CannedBackend {
    fn manager(&self) -> ManagerKind {
        self.manager
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(30)
    }

    async fn search(&self, _query: &str) -> Result<Vec<SearchResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if self.fail {
            bail!("registry unreachable");
        }
        Ok(self
            .hits
            .iter()
            .map(|(name, score)| SearchResult::new(*name, "", self.manager, *score))
            .collect())
    }
}

fn aggregator(
    backends: &[Arc<CannedBackend>],
    present: &[ManagerKind],
    cache: SearchCache,
    timeout: Duration,
) -> SearchAggregator {
    let mut registry = BackendRegistry::new();
    for backend in backends {
        registry.register(backend.clone());
    }
    SearchAggregator::new(
        registry,
        Arc::new(DetectionMap::from_present(present.iter().copied())),
        Arc::new(cache),
        SearchOptions {
            timeout,
            max_concurrent: 5,
        },
    )
}

#[tokio::test]
async fn test_results_merge_by_relevance() {
    let apt = Arc::new(CannedBackend::new(ManagerKind::Apt, &[("bar", 40.0)]));
    let pip = Arc::new(CannedBackend::new(ManagerKind::Pip, &[("foo", 95.0)]));
    let search = aggregator(
        &[apt, pip],
        &[ManagerKind::Apt, ManagerKind::Pip],
        SearchCache::default(),
        Duration::from_secs(10),
    );

    let outcome = search.search("foo", None, 20).await;

    let names: Vec<&str> = outcome.results.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["foo", "bar"]);
    assert!(!outcome.from_cache);
    assert_eq!(outcome.succeeded_backends(), 2);
}

#[tokio::test]
async fn test_limit_applies_after_sorting() {
    let npm = Arc::new(CannedBackend::new(
        ManagerKind::Npm,
        &[("low", 10.0), ("high", 90.0), ("mid", 50.0)],
    ));
    let search = aggregator(
        &[npm],
        &[ManagerKind::Npm],
        SearchCache::default(),
        Duration::from_secs(10),
    );

    let outcome = search.search("x", None, 2).await;

    let names: Vec<&str> = outcome.results.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["high", "mid"]);
}

#[tokio::test]
async fn test_cache_hit_skips_backends_until_stale() {
    let brew = Arc::new(CannedBackend::new(ManagerKind::Brew, &[("wget", 100.0)]));
    let search = aggregator(
        &[brew.clone()],
        &[ManagerKind::Brew],
        SearchCache::new(Duration::from_millis(200), Duration::from_secs(5), 50),
        Duration::from_secs(10),
    );

    let first = search.search("wget", None, 20).await;
    let second = search.search("wget", None, 20).await;

    assert_eq!(brew.calls(), 1);
    assert!(second.from_cache);
    assert_eq!(second.results, first.results);

    tokio::time::sleep(Duration::from_millis(300)).await;
    let third = search.search("wget", None, 20).await;

    assert_eq!(brew.calls(), 2);
    assert!(!third.from_cache);
}

#[tokio::test]
async fn test_different_limit_is_a_different_cache_entry() {
    let brew = Arc::new(CannedBackend::new(ManagerKind::Brew, &[("wget", 100.0)]));
    let search = aggregator(
        &[brew.clone()],
        &[ManagerKind::Brew],
        SearchCache::default(),
        Duration::from_secs(10),
    );

    search.search("wget", None, 20).await;
    search.search("wget", None, 5).await;

    assert_eq!(brew.calls(), 2);
}

#[tokio::test]
async fn test_failed_backend_does_not_sink_the_search() {
    let apt = Arc::new(CannedBackend::new(ManagerKind::Apt, &[]).failing());
    let snap = Arc::new(CannedBackend::new(ManagerKind::Snap, &[("htop", 15.0)]));
    let search = aggregator(
        &[apt, snap],
        &[ManagerKind::Apt, ManagerKind::Snap],
        SearchCache::default(),
        Duration::from_secs(10),
    );

    let outcome = search.search("htop", None, 20).await;

    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.failed_backends(), 1);
    let failed = outcome.backends.iter().find(|s| !s.ok).unwrap();
    assert_eq!(failed.manager, ManagerKind::Apt);
    assert!(failed.error.as_deref().unwrap().contains("registry unreachable"));
}

#[tokio::test]
async fn test_slow_backend_abandoned_at_deadline() {
    let quick = Arc::new(CannedBackend::new(ManagerKind::Npm, &[("left-pad", 80.0)]));
    let slow = Arc::new(
        CannedBackend::new(ManagerKind::Pip, &[("never", 95.0)]).delayed(Duration::from_secs(20)),
    );
    let search = aggregator(
        &[quick, slow],
        &[ManagerKind::Npm, ManagerKind::Pip],
        SearchCache::default(),
        Duration::from_millis(300),
    );

    let started = Instant::now();
    let outcome = search.search("pad", None, 20).await;

    assert!(started.elapsed() < Duration::from_secs(5));
    let names: Vec<&str> = outcome.results.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["left-pad"]);
    let abandoned = outcome
        .backends
        .iter()
        .find(|s| s.manager == ManagerKind::Pip)
        .unwrap();
    assert!(!abandoned.ok);
}

#[tokio::test]
async fn test_only_present_managers_are_queried() {
    let apt = Arc::new(CannedBackend::new(ManagerKind::Apt, &[("vim", 20.0)]));
    let dnf = Arc::new(CannedBackend::new(ManagerKind::Dnf, &[("vim", 25.0)]));
    let search = aggregator(
        &[apt.clone(), dnf.clone()],
        &[ManagerKind::Apt],
        SearchCache::default(),
        Duration::from_secs(10),
    );

    let outcome = search.search("vim", None, 20).await;

    assert_eq!(outcome.results.len(), 1);
    assert_eq!(apt.calls(), 1);
    assert_eq!(dnf.calls(), 0);
}

#[tokio::test]
async fn test_manager_filter_for_absent_manager_is_empty() {
    let apt = Arc::new(CannedBackend::new(ManagerKind::Apt, &[("vim", 20.0)]));
    let search = aggregator(
        &[apt.clone()],
        &[ManagerKind::Apt],
        SearchCache::default(),
        Duration::from_secs(10),
    );

    let outcome = search.search("vim", Some(ManagerKind::Brew), 20).await;

    assert!(outcome.results.is_empty());
    assert_eq!(apt.calls(), 0);
}

/// Records how many searches are in flight at once
struct GaugeBackend {
    manager: ManagerKind,
    running: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

#[async_trait]
impl SearchBackend for GaugeBackend {
    fn manager(&self) -> ManagerKind {
        self.manager
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(30)
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(vec![SearchResult::new(query, "", self.manager, 50.0)])
    }
}

#[tokio::test]
async fn test_fan_out_never_exceeds_concurrency_cap() {
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let mut registry = BackendRegistry::new();
    for manager in ManagerKind::ALL {
        registry.register(Arc::new(GaugeBackend {
            manager,
            running: running.clone(),
            peak: peak.clone(),
        }));
    }
    let search = SearchAggregator::new(
        registry,
        Arc::new(DetectionMap::from_present(ManagerKind::ALL)),
        Arc::new(SearchCache::default()),
        SearchOptions {
            timeout: Duration::from_secs(10),
            max_concurrent: 5,
        },
    );

    let outcome = search.search("jq", None, 50).await;

    assert_eq!(outcome.succeeded_backends(), ManagerKind::ALL.len());
    assert_eq!(outcome.results.len(), ManagerKind::ALL.len());
    let peak = peak.load(Ordering::SeqCst);
    assert!(peak >= 2, "backends never overlapped");
    assert!(peak <= 5, "{peak} backends ran at once");
}
