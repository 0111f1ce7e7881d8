//! Record of packages installed through crossfire

pub mod sqlite;

pub use sqlite::SqliteTrackingStore;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::Mutex;

use crate::managers::ManagerKind;

/// One tracked installation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedPackage {
    pub name: String,
    pub version: String,
    pub manager: ManagerKind,
    /// The command line that performed the install
    pub command: String,
    pub installed_at: DateTime<Utc>,
}

impl TrackedPackage {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        manager: ManagerKind,
        command: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            manager,
            command: command.into(),
            installed_at: Utc::now(),
        }
    }
}

/// Key-value store of tracked packages, keyed by package name.
///
/// Implementations must serialise mutations so concurrent batch workers can
/// write distinct keys safely.
#[async_trait]
pub trait TrackingStore: Send + Sync {
    /// Insert or replace the record for `record.name`
    async fn upsert(&self, record: TrackedPackage) -> Result<()>;

    async fn get(&self, name: &str) -> Result<Option<TrackedPackage>>;

    /// Delete a record, returning whether one existed
    async fn remove(&self, name: &str) -> Result<bool>;

    /// All records ordered by name
    async fn list(&self) -> Result<Vec<TrackedPackage>>;
}

/// In-process store, used when persistence is disabled
#[derive(Debug, Default)]
pub struct MemoryTrackingStore {
    records: Mutex<BTreeMap<String, TrackedPackage>>,
}

impl MemoryTrackingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TrackingStore for MemoryTrackingStore {
    async fn upsert(&self, record: TrackedPackage) -> Result<()> {
        self.records.lock().await.insert(record.name.clone(), record);
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Option<TrackedPackage>> {
        Ok(self.records.lock().await.get(name).cloned())
    }

    async fn remove(&self, name: &str) -> Result<bool> {
        Ok(self.records.lock().await.remove(name).is_some())
    }

    async fn list(&self) -> Result<Vec<TrackedPackage>> {
        Ok(self.records.lock().await.values().cloned().collect())
    }
}
