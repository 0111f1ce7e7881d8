use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;
use tokio_rusqlite::{params, Connection};

use super::{TrackedPackage, TrackingStore};
use crate::managers::ManagerKind;

/// SQLite-backed tracking store.
///
/// All calls run on the connection's single background thread, so writes from
/// concurrent workers are applied one at a time.
pub struct SqliteTrackingStore {
    conn: Connection,
}

impl SqliteTrackingStore {
    /// Open (creating if needed) the database at `db_path`
    pub async fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.with_context(|| {
                    format!("Failed to create database directory: {}", parent.display())
                })?;
            }
        }

        let conn = Connection::open(db_path)
            .await
            .with_context(|| format!("Failed to open package database: {}", db_path.display()))?;

        let store = Self { conn };
        store.initialize().await?;
        Ok(store)
    }

    /// Open a private in-memory database
    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .await
            .context("Failed to open in-memory package database")?;

        let store = Self { conn };
        store.initialize().await?;
        Ok(store)
    }

    async fn initialize(&self) -> Result<()> {
        self.conn
            .call(|conn| {
                conn.execute(
                    r#"
                    CREATE TABLE IF NOT EXISTS packages (
                        name TEXT PRIMARY KEY,
                        version TEXT NOT NULL,
                        manager TEXT NOT NULL,
                        command TEXT NOT NULL,
                        installed_at TEXT NOT NULL -- ISO 8601 datetime
                    )
                    "#,
                    [],
                )?;

                conn.execute(
                    "CREATE INDEX IF NOT EXISTS idx_packages_manager ON packages(manager)",
                    [],
                )?;

                Ok(())
            })
            .await
            .context("Failed to initialize package tables")?;

        Ok(())
    }
}

fn row_to_package(row: &rusqlite::Row<'_>) -> rusqlite::Result<TrackedPackage> {
    let manager_str: String = row.get(2)?;
    let manager: ManagerKind = manager_str.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let installed_at_str: String = row.get(4)?;
    let installed_at = DateTime::parse_from_rfc3339(&installed_at_str)
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?
        .with_timezone(&Utc);

    Ok(TrackedPackage {
        name: row.get(0)?,
        version: row.get(1)?,
        manager,
        command: row.get(3)?,
        installed_at,
    })
}

#[async_trait]
impl TrackingStore for SqliteTrackingStore {
    async fn upsert(&self, record: TrackedPackage) -> Result<()> {
        let name = record.name.clone();

        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"
                    INSERT OR REPLACE INTO packages
                    (name, version, manager, command, installed_at)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                    "#,
                    params![
                        record.name,
                        record.version,
                        record.manager.as_str(),
                        record.command,
                        record.installed_at.to_rfc3339()
                    ],
                )?;
                Ok(())
            })
            .await
            .with_context(|| format!("Failed to record package '{name}'"))?;

        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Option<TrackedPackage>> {
        let name = name.to_string();

        let result = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT name, version, manager, command, installed_at
                     FROM packages WHERE name = ?1",
                )?;

                match stmt.query_row(params![name], row_to_package) {
                    Ok(record) => Ok(Some(record)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(tokio_rusqlite::Error::Rusqlite(e)),
                }
            })
            .await
            .context("Failed to look up tracked package")?;

        Ok(result)
    }

    async fn remove(&self, name: &str) -> Result<bool> {
        let name = name.to_string();

        let removed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute("DELETE FROM packages WHERE name = ?1", params![name])?;
                Ok(changed > 0)
            })
            .await
            .context("Failed to remove tracked package")?;

        Ok(removed)
    }

    async fn list(&self) -> Result<Vec<TrackedPackage>> {
        let packages = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT name, version, manager, command, installed_at
                     FROM packages ORDER BY name",
                )?;

                let rows = stmt.query_map([], row_to_package)?;
                let mut packages = Vec::new();
                for row in rows {
                    packages.push(row?);
                }
                Ok(packages)
            })
            .await
            .context("Failed to list tracked packages")?;

        Ok(packages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_sqlite_store_persists_across_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("packages.db");

        {
            let store = SqliteTrackingStore::open(&db_path).await.unwrap();
            store
                .upsert(TrackedPackage::new(
                    "ripgrep",
                    "14.1.0",
                    ManagerKind::Brew,
                    "brew install ripgrep",
                ))
                .await
                .unwrap();
        }

        let store = SqliteTrackingStore::open(&db_path).await.unwrap();
        let record = store.get("ripgrep").await.unwrap().unwrap();
        assert_eq!(record.version, "14.1.0");
        assert_eq!(record.manager, ManagerKind::Brew);
        assert_eq!(record.command, "brew install ripgrep");
    }

    #[tokio::test]
    async fn test_sqlite_store_upsert_replaces() {
        let store = SqliteTrackingStore::open_in_memory().await.unwrap();
        store
            .upsert(TrackedPackage::new("vim", "9.0", ManagerKind::Apt, "apt-get install -y vim"))
            .await
            .unwrap();
        store
            .upsert(TrackedPackage::new("vim", "9.1", ManagerKind::Snap, "snap install vim"))
            .await
            .unwrap();

        let all = store.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].version, "9.1");
        assert_eq!(all[0].manager, ManagerKind::Snap);
    }

    #[tokio::test]
    async fn test_sqlite_store_remove_missing() {
        let store = SqliteTrackingStore::open_in_memory().await.unwrap();
        assert!(!store.remove("nothing").await.unwrap());
        assert!(store.get("nothing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sqlite_store_concurrent_writes() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(
            SqliteTrackingStore::open(temp_dir.path().join("packages.db"))
                .await
                .unwrap(),
        );

        let mut tasks = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store
                    .upsert(TrackedPackage::new(
                        format!("pkg-{i:02}"),
                        "1.0.0",
                        ManagerKind::Pip,
                        "pip install",
                    ))
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let all = store.list().await.unwrap();
        assert_eq!(all.len(), 20);
        assert_eq!(all[0].name, "pkg-00");
        assert_eq!(all[19].name, "pkg-19");
    }
}
