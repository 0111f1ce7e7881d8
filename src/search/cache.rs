use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

use super::SearchResult;
use crate::config::SearchConfig;
use crate::managers::ManagerKind;

/// Cached search results with a timestamp
#[derive(Debug, Clone)]
struct CachedSearch {
    results: Vec<SearchResult>,
    cached_at: Instant,
}

/// In-memory cache of final search results, shared by concurrent searches.
///
/// Entries are served only while younger than `fresh_for`. Entries older than
/// `evict_after` are pruned once the cache holds more than `max_entries`.
#[derive(Debug)]
pub struct SearchCache {
    entries: Mutex<HashMap<String, CachedSearch>>,
    fresh_for: Duration,
    evict_after: Duration,
    max_entries: usize,
}

impl Default for SearchCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(900), Duration::from_secs(1800), 50)
    }
}

impl SearchCache {
    pub fn new(fresh_for: Duration, evict_after: Duration, max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            fresh_for,
            evict_after,
            max_entries,
        }
    }

    pub fn from_config(config: &SearchConfig) -> Self {
        Self::new(
            Duration::from_secs(config.cache_fresh_secs),
            Duration::from_secs(config.cache_stale_secs),
            config.cache_max_entries,
        )
    }

    /// Composite key of query, manager filter and limit
    pub fn key(query: &str, manager: Option<ManagerKind>, limit: usize) -> String {
        format!(
            "{}|{}|{}",
            query,
            manager.map(|m| m.as_str()).unwrap_or("*"),
            limit
        )
    }

    /// Results for `key` if cached within the freshness window
    pub fn get(&self, key: &str) -> Option<Vec<SearchResult>> {
        let entries = self.entries.lock().ok()?;
        let cached = entries.get(key)?;
        if cached.cached_at.elapsed() < self.fresh_for {
            Some(cached.results.clone())
        } else {
            None
        }
    }

    pub fn insert(&self, key: String, results: Vec<SearchResult>) {
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };

        entries.insert(
            key,
            CachedSearch {
                results,
                cached_at: Instant::now(),
            },
        );

        if entries.len() > self.max_entries {
            let before = entries.len();
            let evict_after = self.evict_after;
            entries.retain(|_, cached| cached.cached_at.elapsed() <= evict_after);
            debug!("Pruned {} stale search cache entries", before - entries.len());
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}
