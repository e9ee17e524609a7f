//! SQLite-backed key/value cache with age-based expiry
//!
//! Values are stored as JSON text next to their creation time. Expiry is
//! lazy: a stale row is deleted by the `get` that notices it, or in bulk by
//! `purge_expired`. There is no background sweep.

use crate::error::CacheError;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Default time-to-live: 7 days
pub const DEFAULT_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// How long a writer waits on a lock held by another process
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Cache {
    conn: Mutex<Connection>,
    path: PathBuf,
    ttl_secs: f64,
}

/// Default database location: `<user cache dir>/uindex/cache.db`
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|p| p.join("uindex"))
        .unwrap_or_else(|| PathBuf::from(".uindex-cache"))
}

fn now_secs() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

impl Cache {
    /// Open (or create) the cache at `path` with the default TTL.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CacheError> {
        Self::open_with_ttl(path, DEFAULT_TTL_SECS)
    }

    pub fn open_with_ttl<P: AsRef<Path>>(path: P, ttl_secs: u64) -> Result<Self, CacheError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| CacheError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let open_err = |source| CacheError::Open { path: path.clone(), source };
        let conn = Connection::open(&path).map_err(open_err)?;
        conn.busy_timeout(BUSY_TIMEOUT).map_err(open_err)?;

        let cache = Cache {
            conn: Mutex::new(conn),
            path: path.clone(),
            ttl_secs: ttl_secs as f64,
        };
        cache.init().map_err(open_err)?;
        Ok(cache)
    }

    fn init(&self) -> rusqlite::Result<()> {
        let conn = self.lock();

        // WAL lets readers in other processes proceed while one process writes
        let _mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS cache (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                created_at REAL NOT NULL,
                ttl_seconds REAL  -- NULL = store-wide TTL
            );
            ",
        )?;

        // Migration: databases written before per-entry TTLs existed
        let has_ttl: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM pragma_table_info('cache') WHERE name = 'ttl_seconds'",
                [],
                |row| row.get(0),
            )?;

        if !has_ttl {
            conn.execute("ALTER TABLE cache ADD COLUMN ttl_seconds REAL", [])?;
        }

        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs as u64
    }

    /// Fetch a live entry. Stale entries are removed and reported as absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        let row: Option<(String, f64, Option<f64>)> = {
            let conn = self.lock();
            conn.query_row(
                "SELECT value, created_at, ttl_seconds FROM cache WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .map_err(|source| CacheError::Read { key: key.to_string(), source })?
        };

        let Some((value, created_at, entry_ttl)) = row else {
            return Ok(None);
        };

        let ttl = entry_ttl.unwrap_or(self.ttl_secs);
        if now_secs() - created_at > ttl {
            tracing::debug!(key, "cache entry expired, removing");
            self.remove_expired(key, created_at)?;
            return Ok(None);
        }

        serde_json::from_str(&value)
            .map(Some)
            .map_err(|source| CacheError::Decode { key: key.to_string(), source })
    }

    /// Insert or replace `key`, resetting its creation time.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), CacheError> {
        self.write(key, value, None)
    }

    /// Like `set`, but the entry expires after `ttl_secs` regardless of the
    /// store-wide TTL.
    pub fn set_with_ttl<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: u64,
    ) -> Result<(), CacheError> {
        self.write(key, value, Some(ttl_secs as f64))
    }

    fn write<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<f64>,
    ) -> Result<(), CacheError> {
        let json = serde_json::to_string(value)
            .map_err(|source| CacheError::Encode { key: key.to_string(), source })?;

        let conn = self.lock();
        conn.execute(
            "INSERT OR REPLACE INTO cache (key, value, created_at, ttl_seconds)
             VALUES (?1, ?2, ?3, ?4)",
            params![key, json, now_secs(), ttl],
        )
        .map_err(|source| CacheError::Write { key: key.to_string(), source })?;
        Ok(())
    }

    pub fn delete(&self, key: &str) -> Result<(), CacheError> {
        let conn = self.lock();
        conn.execute("DELETE FROM cache WHERE key = ?1", params![key])
            .map_err(|source| CacheError::Write { key: key.to_string(), source })?;
        Ok(())
    }

    /// Delete `key` only if it still holds the row written at `created_at`;
    /// a concurrent rewrite since the read is left alone.
    fn remove_expired(&self, key: &str, created_at: f64) -> Result<(), CacheError> {
        let conn = self.lock();
        conn.execute(
            "DELETE FROM cache WHERE key = ?1 AND created_at = ?2",
            params![key, created_at],
        )
        .map_err(|source| CacheError::Write { key: key.to_string(), source })?;
        Ok(())
    }

    /// Remove every expired row. Returns the number of rows deleted.
    pub fn purge_expired(&self) -> Result<usize, CacheError> {
        let conn = self.lock();
        let removed = conn
            .execute(
                "DELETE FROM cache WHERE ?1 - created_at > COALESCE(ttl_seconds, ?2)",
                params![now_secs(), self.ttl_secs],
            )
            .map_err(|source| CacheError::Write { key: "*".to_string(), source })?;

        if removed > 0 {
            tracing::info!(removed, "purged expired cache entries");
        }
        Ok(removed)
    }

    /// Number of stored rows, including stale ones not yet purged
    pub fn len(&self) -> Result<usize, CacheError> {
        let conn = self.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM cache", [], |row| row.get(0))
            .map_err(|source| CacheError::Read { key: "*".to_string(), source })?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len()? == 0)
    }
}
