//! Persistent analysis cache keyed by content fingerprint.
//!
//! The cache maps [`Fingerprint`] → [`FileAnalysis`] so unchanged files never
//! reach the inference service twice. All rows are loaded into memory once at
//! open, so `lookup` never touches the database; `store` updates the map and
//! upserts the row incrementally. A store that cannot be read is treated as
//! empty (fail-open): a cache miss only costs a redundant dispatch, never
//! correctness.
//!
//! Eviction is a maintenance operation for `atlas cache evict`, run between
//! analysis runs only.

use anyhow::{Context, Result};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::db;
use crate::fingerprint::Fingerprint;
use crate::models::FileAnalysis;

pub struct AnalysisCache {
    pool: SqlitePool,
    entries: RwLock<HashMap<String, FileAnalysis>>,
    path: PathBuf,
}

impl AnalysisCache {
    /// Open the cache store, creating schema and loading all valid entries.
    ///
    /// A store that cannot be opened or read is discarded and recreated
    /// after a warning; individual rows that fail to decode are skipped.
    pub async fn open(cache_path: &Path) -> Result<Self> {
        match Self::try_open(cache_path).await {
            Ok(cache) => Ok(cache),
            Err(e) => {
                eprintln!(
                    "Warning: analysis cache at {} is unreadable ({}); starting with an empty cache",
                    cache_path.display(),
                    e
                );
                discard_store(cache_path);
                Self::try_open(cache_path)
                    .await
                    .with_context(|| "Failed to recreate analysis cache store")
            }
        }
    }

    async fn try_open(cache_path: &Path) -> Result<Self> {
        let pool = db::connect(cache_path).await?;
        ensure_schema(&pool).await?;

        let rows = sqlx::query("SELECT fingerprint, path, analysis_json FROM analysis_cache")
            .fetch_all(&pool)
            .await?;

        let mut entries = HashMap::with_capacity(rows.len());
        for row in &rows {
            let fingerprint: String = row.get("fingerprint");
            let json: String = row.get("analysis_json");
            match serde_json::from_str::<FileAnalysis>(&json) {
                Ok(analysis) => {
                    entries.insert(fingerprint, analysis);
                }
                Err(e) => {
                    let path: String = row.get("path");
                    eprintln!(
                        "Warning: invalid cache entry for {} ({}); it will be regenerated",
                        path, e
                    );
                }
            }
        }

        Ok(Self {
            pool,
            entries: RwLock::new(entries),
            path: cache_path.to_path_buf(),
        })
    }

    /// In-memory lookup; never blocks on I/O.
    pub fn lookup(&self, fingerprint: &Fingerprint) -> Option<FileAnalysis> {
        self.entries
            .read()
            .expect("cache map lock poisoned")
            .get(fingerprint.as_str())
            .cloned()
    }

    /// Record one successful analysis. Idempotent: re-storing the same
    /// fingerprint replaces the row with equal content.
    pub async fn store(
        &self,
        fingerprint: &Fingerprint,
        path: &str,
        analysis: &FileAnalysis,
    ) -> Result<()> {
        {
            let mut entries = self.entries.write().expect("cache map lock poisoned");
            entries.insert(fingerprint.as_str().to_string(), analysis.clone());
        }

        let json = serde_json::to_string(analysis)?;
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO analysis_cache (fingerprint, path, analysis_json, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(fingerprint) DO UPDATE SET
                path = excluded.path,
                analysis_json = excluded.analysis_json
            "#,
        )
        .bind(fingerprint.as_str())
        .bind(path)
        .bind(&json)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("cache map lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn store_path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Drop entries older than `older_than_days` and/or beyond `max_entries`
    /// (oldest first). Returns the number of rows removed. Maintenance only;
    /// never called during an analysis run.
    pub async fn evict(
        &self,
        older_than_days: Option<u32>,
        max_entries: Option<u64>,
    ) -> Result<u64> {
        let mut removed = 0u64;

        if let Some(days) = older_than_days {
            let cutoff = chrono::Utc::now().timestamp() - i64::from(days) * 86_400;
            let result = sqlx::query("DELETE FROM analysis_cache WHERE created_at < ?")
                .bind(cutoff)
                .execute(&self.pool)
                .await?;
            removed += result.rows_affected();
        }

        if let Some(cap) = max_entries {
            let result = sqlx::query(
                r#"
                DELETE FROM analysis_cache WHERE fingerprint NOT IN (
                    SELECT fingerprint FROM analysis_cache
                    ORDER BY created_at DESC, fingerprint
                    LIMIT ?
                )
                "#,
            )
            .bind(cap as i64)
            .execute(&self.pool)
            .await?;
            removed += result.rows_affected();
        }

        // Refresh the in-memory view to match the store.
        let rows = sqlx::query("SELECT fingerprint, analysis_json FROM analysis_cache")
            .fetch_all(&self.pool)
            .await?;
        let mut entries = HashMap::with_capacity(rows.len());
        for row in &rows {
            let fingerprint: String = row.get("fingerprint");
            let json: String = row.get("analysis_json");
            if let Ok(analysis) = serde_json::from_str::<FileAnalysis>(&json) {
                entries.insert(fingerprint, analysis);
            }
        }
        *self.entries.write().expect("cache map lock poisoned") = entries;

        Ok(removed)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS analysis_cache (
            fingerprint TEXT PRIMARY KEY,
            path TEXT NOT NULL,
            analysis_json TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_cache_created ON analysis_cache (created_at)")
        .execute(pool)
        .await?;

    Ok(())
}

fn discard_store(cache_path: &Path) {
    for suffix in ["", "-wal", "-shm"] {
        let mut path = cache_path.as_os_str().to_owned();
        path.push(suffix);
        let _ = std::fs::remove_file(PathBuf::from(path));
    }
}
