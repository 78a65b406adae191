use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};
use tokio::sync::Mutex;
use tracing::{debug, warn};

mod catalog;

pub use catalog::{
    SessionCatalog, UploadClaim, WalkthroughStore, CATALOG_SCHEMA_VERSION, WALKTHROUGHS_KEY,
};

/// Durable string storage addressed by key.
#[async_trait]
pub trait KeyValueBackend: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<String>>;
    async fn save(&self, key: &str, value: &str) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

#[derive(Clone)]
pub struct SqliteBackend {
    pool: Pool<Sqlite>,
}

impl SqliteBackend {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid sqlite url '{database_url}'"))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await
            .with_context(|| format!("failed to open sqlite database '{database_url}'"))?;
        let backend = Self { pool };
        backend.ensure_kv_table().await?;
        Ok(backend)
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn keys(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT key FROM kv_entries ORDER BY key")
            .fetch_all(&self.pool)
            .await
            .context("failed to list kv_entries keys")?;
        rows.into_iter()
            .map(|row| row.try_get::<String, _>("key").map_err(Into::into))
            .collect()
    }

    async fn ensure_kv_table(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_entries (
                key        TEXT PRIMARY KEY NOT NULL,
                value      TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to ensure kv_entries table exists")?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueBackend for SqliteBackend {
    async fn load(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM kv_entries WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to read key '{key}'"))?;
        Ok(row.map(|r| r.get::<String, _>("value")))
    }

    async fn save(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO kv_entries (key, value, updated_at) VALUES (?1, ?2, CURRENT_TIMESTAMP)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to write key '{key}'"))?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM kv_entries WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to remove key '{key}'"))?;
        Ok(())
    }
}

/// Process-local backend; contents vanish with the process.
#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueBackend for MemoryBackend {
    async fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn save(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

/// A single persisted value cell.
///
/// Reads are served from memory. Every write replaces the whole value and is
/// saved before the call returns; a failed save is logged and the in-memory
/// value is kept, so memory may run ahead of what is on disk.
pub struct LocalStore<T> {
    key: String,
    backend: Arc<dyn KeyValueBackend>,
    default: T,
    value: Mutex<T>,
}

impl<T> LocalStore<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    pub async fn open(backend: Arc<dyn KeyValueBackend>, key: impl Into<String>, default: T) -> Self {
        let key = key.into();
        let value = match backend.load(&key).await {
            Ok(Some(raw)) => match serde_json::from_str::<T>(&raw) {
                Ok(value) => value,
                Err(err) => {
                    warn!("local store: undecodable value key={key}, using default: {err}");
                    default.clone()
                }
            },
            Ok(None) => {
                debug!("local store: key={key} absent, using default");
                default.clone()
            }
            Err(err) => {
                warn!("local store: read failed key={key}, using default: {err:#}");
                default.clone()
            }
        };

        Self {
            key,
            backend,
            default,
            value: Mutex::new(value),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn get(&self) -> T {
        self.value.lock().await.clone()
    }

    pub async fn set(&self, value: T) {
        let mut guard = self.value.lock().await;
        *guard = value;
        self.persist(&guard).await;
    }

    /// Replaces the value with `transform(current)` under one lock.
    pub async fn update<F>(&self, transform: F) -> T
    where
        F: FnOnce(T) -> T,
    {
        let mut guard = self.value.lock().await;
        let next = transform(guard.clone());
        *guard = next.clone();
        self.persist(&guard).await;
        next
    }

    /// In-place variant of [`update`](Self::update). `modify` reports whether
    /// it changed anything; unchanged values are not written back.
    pub async fn modify<F>(&self, modify: F) -> bool
    where
        F: FnOnce(&mut T) -> bool,
    {
        let mut guard = self.value.lock().await;
        let changed = modify(&mut guard);
        if changed {
            self.persist(&guard).await;
        }
        changed
    }

    /// Writes the current value, surfacing the error instead of logging it.
    pub async fn flush(&self) -> Result<()> {
        let guard = self.value.lock().await;
        self.try_persist(&guard).await
    }

    /// Drops the stored key and returns the cell to its default value.
    pub async fn reset(&self) {
        let mut guard = self.value.lock().await;
        *guard = self.default.clone();
        if let Err(err) = self.backend.remove(&self.key).await {
            warn!("local store: remove failed key={}: {err:#}", self.key);
        }
    }

    async fn persist(&self, value: &T) {
        if let Err(err) = self.try_persist(value).await {
            warn!(
                "local store: persist failed key={}, keeping in-memory value: {err:#}",
                self.key
            );
        }
    }

    async fn try_persist(&self, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)
            .with_context(|| format!("failed to serialize value for key '{}'", self.key))?;
        self.backend.save(&self.key, &raw).await
    }
}

/// Turns a user-supplied database location into an sqlx sqlite url and
/// creates its parent directory. Plain paths, `sqlite:` and `sqlite://` forms
/// are accepted; drive-letter paths keep a single colon (`sqlite:C:/x.db`).
pub fn prepare_database_url(raw_database_url: &str) -> Result<String> {
    let database_url = normalize_database_url(raw_database_url)?;
    ensure_sqlite_parent_dir_exists(&database_url)?;
    Ok(database_url)
}

pub fn normalize_database_url(raw_database_url: &str) -> Result<String> {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        bail!("database url is empty");
    }

    if raw_database_url.starts_with("sqlite::memory:") {
        return Ok(raw_database_url.to_string());
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite://") {
        return Ok(sqlite_url_for_path(path));
    }

    if raw_database_url.contains("://") {
        return Ok(raw_database_url.to_string());
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        return Ok(sqlite_url_for_path(path));
    }

    Ok(sqlite_url_for_path(raw_database_url))
}

fn sqlite_url_for_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        return format!("sqlite:{path}");
    }
    format!("sqlite://{path}")
}

/// Creates the directory holding a file-backed sqlite database, if any.
pub fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
