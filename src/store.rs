//! Keyed session storage with a size quota, mirroring what a browser's
//! local storage allows for one origin.

use sqlx::{sqlite::SqliteConnectOptions, sqlite::SqlitePoolOptions, Pool, Row, Sqlite};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::session::Session;
use crate::utils::now_iso;

pub const STORAGE_KEY: &str = "carbon_crisis_save_v1";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage quota exceeded: {size} bytes (limit {limit})")]
    QuotaExceeded { size: usize, limit: usize },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[allow(async_fn_in_trait)]
pub trait SessionStore {
    async fn load(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn save(&self, key: &str, value: &str) -> Result<(), StoreError>;
    async fn clear(&self, key: &str) -> Result<(), StoreError>;
}

fn check_quota(value: &str, limit: Option<usize>) -> Result<(), StoreError> {
    match limit {
        Some(limit) if value.len() > limit => Err(StoreError::QuotaExceeded {
            size: value.len(),
            limit,
        }),
        _ => Ok(()),
    }
}

pub struct SqliteStore {
    pool: Pool<Sqlite>,
    quota: usize,
}

async fn init_db(pool: &Pool<Sqlite>) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS kv_store (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

impl SqliteStore {
    pub async fn open(db_path: &Path, quota: usize) -> Result<Self, StoreError> {
        let opts = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await?;
        init_db(&pool).await?;
        info!(path = %db_path.display(), quota, "session store ready");
        Ok(Self { pool, quota })
    }

    /// Private in-memory database, gone when the store is dropped.
    pub async fn in_memory(quota: usize) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        init_db(&pool).await?;
        Ok(Self { pool, quota })
    }
}

impl SessionStore for SqliteStore {
    async fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        let row = sqlx::query("SELECT value FROM kv_store WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<String, _>("value")))
    }

    async fn save(&self, key: &str, value: &str) -> Result<(), StoreError> {
        check_quota(value, Some(self.quota))?;
        sqlx::query(
            r#"
            INSERT INTO kv_store (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
              value=excluded.value,
              updated_at=excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(now_iso())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn clear(&self, key: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM kv_store WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Same contract as [`SqliteStore`], held in memory.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    quota: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota: usize) -> Self {
        Self {
            entries: Mutex::default(),
            quota: Some(quota),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().ok()?.get(key).cloned()
    }
}

impl SessionStore for MemoryStore {
    async fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.get(key))
    }

    async fn save(&self, key: &str, value: &str) -> Result<(), StoreError> {
        check_quota(value, self.quota)?;
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), value.to_string());
        }
        Ok(())
    }

    async fn clear(&self, key: &str) -> Result<(), StoreError> {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(key);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    Full,
    /// Written without scene images after the full record was refused.
    Degraded,
    Failed,
}

/// Best-effort write of the whole session. Never fails the caller; a
/// refused write is retried once without scene images, then logged.
pub async fn persist_session<S: SessionStore>(store: &S, session: &Session) -> PersistOutcome {
    let full = match serde_json::to_string(session) {
        Ok(json) => json,
        Err(e) => {
            error!(error = %e, "failed to serialize session");
            return PersistOutcome::Failed;
        }
    };
    let first_err = match store.save(STORAGE_KEY, &full).await {
        Ok(()) => {
            debug!(bytes = full.len(), "session saved");
            return PersistOutcome::Full;
        }
        Err(e) => e,
    };
    warn!(error = %first_err, "full session save refused, retrying without images");

    let degraded = match serde_json::to_string(&session.without_image_urls()) {
        Ok(json) => json,
        Err(e) => {
            error!(error = %e, "failed to serialize degraded session");
            return PersistOutcome::Failed;
        }
    };
    match store.save(STORAGE_KEY, &degraded).await {
        Ok(()) => {
            info!(bytes = degraded.len(), "session saved without scene images");
            PersistOutcome::Degraded
        }
        Err(e) => {
            error!(error = %e, "session could not be saved");
            PersistOutcome::Failed
        }
    }
}

/// Reads the saved session, if any. Unreadable records are discarded
/// and a fresh session starts.
pub async fn restore_session<S: SessionStore>(store: &S) -> Option<Session> {
    let raw = match store.load(STORAGE_KEY).await {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            warn!(error = %e, "failed to read saved session");
            return None;
        }
    };
    match serde_json::from_str::<Session>(&raw) {
        Ok(session) => {
            info!(id = %session.id, page = ?session.page, "session restored");
            Some(session.restore())
        }
        Err(e) => {
            warn!(error = %e, "saved session unreadable, starting fresh");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::CharacterProfile;
    use crate::session::ImageTarget;

    fn illustrated_session() -> Session {
        let mut s = Session::new();
        s.start().unwrap();
        s.set_theme("해수면 상승");
        s.submit_character(CharacterProfile {
            reference_image: Some("data:image/png;base64,UkVG".into()),
            ..CharacterProfile::default()
        })
        .unwrap();
        s.begin_prologue_text().unwrap();
        s.finish_prologue_text(Ok(("물이 차오른다.".into(), "looking at the sea".into())));
        s.begin_image(ImageTarget::Prologue).unwrap();
        let big = format!("data:image/png;base64,{}", "A".repeat(4096));
        s.finish_image(ImageTarget::Prologue, Ok(big)).unwrap();
        s
    }

    #[tokio::test]
    async fn quota_failure_degrades_to_text_only() {
        let session = illustrated_session();
        let text_only = serde_json::to_string(&session.without_image_urls()).unwrap();
        let store = MemoryStore::with_quota(text_only.len() + 16);

        assert_eq!(persist_session(&store, &session).await, PersistOutcome::Degraded);

        let saved: serde_json::Value =
            serde_json::from_str(&store.get(STORAGE_KEY).unwrap()).unwrap();
        assert!(saved["prologue"]["image"].get("url").is_none());
        for ending in saved["endings"].as_array().unwrap() {
            assert!(ending["image"].get("url").is_none());
        }
        assert_eq!(saved["prologue"]["scenario"], "물이 차오른다.");
        assert_eq!(saved["prologue"]["composition"], "looking at the sea");
        assert_eq!(saved["theme"], "해수면 상승");
        assert_eq!(saved["character"]["referenceImage"], "data:image/png;base64,UkVG");
    }

    #[tokio::test]
    async fn hopeless_quota_fails_quietly() {
        let store = MemoryStore::with_quota(10);
        assert_eq!(
            persist_session(&store, &illustrated_session()).await,
            PersistOutcome::Failed
        );
        assert!(store.get(STORAGE_KEY).is_none());
    }

    #[tokio::test]
    async fn sqlite_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("app.sqlite"), 5 * 1024 * 1024)
            .await
            .unwrap();
        assert!(restore_session(&store).await.is_none());

        let session = illustrated_session();
        assert_eq!(persist_session(&store, &session).await, PersistOutcome::Full);
        let restored = restore_session(&store).await.unwrap();
        assert_eq!(restored.id, session.id);
        assert_eq!(restored.prologue, session.prologue);
        assert!(!restored.is_busy());

        store.clear(STORAGE_KEY).await.unwrap();
        assert!(restore_session(&store).await.is_none());
    }

    #[tokio::test]
    async fn sqlite_enforces_quota() {
        let store = SqliteStore::in_memory(64).await.unwrap();
        let err = store.save(STORAGE_KEY, &"x".repeat(65)).await.unwrap_err();
        assert!(matches!(err, StoreError::QuotaExceeded { size: 65, limit: 64 }));
    }

    #[tokio::test]
    async fn corrupt_record_starts_fresh() {
        let store = MemoryStore::new();
        store.save(STORAGE_KEY, "{\"id\": 3").await.unwrap();
        assert!(restore_session(&store).await.is_none());
    }
}
