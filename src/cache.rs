use async_trait::async_trait;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::warn;

use crate::story::NewsCache;

/// Storage slot the snapshot lives under.
pub const CACHE_KEY: &str = "daily_news_cache_et";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
    #[error("could not encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Get/set access to the single persisted snapshot.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn load(&self) -> Result<Option<NewsCache>, CacheError>;
    async fn store(&self, cache: &NewsCache) -> Result<(), CacheError>;
    async fn clear(&self) -> Result<(), CacheError>;
}

/// Decode a stored value, treating garbage as a miss.
fn decode(raw: &str) -> Option<NewsCache> {
    match serde_json::from_str(raw) {
        Ok(cache) => Some(cache),
        Err(e) => {
            warn!("Ignoring unreadable news cache: {}", e);
            None
        }
    }
}

pub struct SqliteCacheStore {
    pool: SqlitePool,
    key: String,
}

impl SqliteCacheStore {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        Ok(Self {
            pool,
            key: CACHE_KEY.to_string(),
        })
    }

    pub async fn initialize(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Raw stored value, bypassing decoding.
    pub async fn raw_value(&self) -> Result<Option<String>, CacheError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM kv_store WHERE key = ?")
            .bind(&self.key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(value,)| value))
    }

    pub async fn put_raw_value(&self, value: &str) -> Result<(), CacheError> {
        sqlx::query(
            r#"
            INSERT INTO kv_store (key, value)
            VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(&self.key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    async fn load(&self) -> Result<Option<NewsCache>, CacheError> {
        Ok(self.raw_value().await?.as_deref().and_then(decode))
    }

    async fn store(&self, cache: &NewsCache) -> Result<(), CacheError> {
        let value = serde_json::to_string(cache)?;
        self.put_raw_value(&value).await
    }

    async fn clear(&self) -> Result<(), CacheError> {
        sqlx::query("DELETE FROM kv_store WHERE key = ?")
            .bind(&self.key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Process-local store; nothing survives a restart.
#[derive(Default)]
pub struct MemoryCacheStore {
    slot: RwLock<Option<String>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_raw_value(&self, value: &str) {
        *self.slot.write().await = Some(value.to_string());
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn load(&self) -> Result<Option<NewsCache>, CacheError> {
        Ok(self.slot.read().await.as_deref().and_then(decode))
    }

    async fn store(&self, cache: &NewsCache) -> Result<(), CacheError> {
        let value = serde_json::to_string(cache)?;
        *self.slot.write().await = Some(value);
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        *self.slot.write().await = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::story::Story;

    async fn create_test_store() -> SqliteCacheStore {
        let store = SqliteCacheStore::new("sqlite::memory:").await.unwrap();
        store.initialize().await.unwrap();
        store
    }

    fn sample_cache(timestamp: i64, count: usize) -> NewsCache {
        let stories = (0..count)
            .map(|i| Story {
                title: format!("Story {}", i),
                link: format!("https://example.com/{}", i),
                image: "img".to_string(),
                excerpt: "Body...".to_string(),
                source: "BBC".to_string(),
                source_color: "#bb1d1d".to_string(),
                pub_date: "2024-01-01 10:00:00".to_string(),
            })
            .collect();
        NewsCache::new(stories, timestamp)
    }

    mod sqlite_tests {
        use super::*;

        #[tokio::test]
        async fn test_empty_store_loads_none() {
            let store = create_test_store().await;
            assert!(store.load().await.unwrap().is_none());
        }

        #[tokio::test]
        async fn test_double_initialization_is_safe() {
            let store = create_test_store().await;
            assert!(store.initialize().await.is_ok());
        }

        #[tokio::test]
        async fn test_store_then_load() {
            let store = create_test_store().await;
            let cache = sample_cache(1_000, 5);

            store.store(&cache).await.unwrap();

            assert_eq!(store.load().await.unwrap(), Some(cache));
        }

        #[tokio::test]
        async fn test_store_overwrites() {
            let store = create_test_store().await;
            store.store(&sample_cache(1_000, 5)).await.unwrap();
            store.store(&sample_cache(2_000, 2)).await.unwrap();

            let loaded = store.load().await.unwrap().unwrap();
            assert_eq!(loaded.timestamp, 2_000);
            assert_eq!(loaded.stories.len(), 2);
        }

        #[tokio::test]
        async fn test_clear() {
            let store = create_test_store().await;
            store.store(&sample_cache(1_000, 1)).await.unwrap();

            store.clear().await.unwrap();

            assert!(store.load().await.unwrap().is_none());
            assert!(store.raw_value().await.unwrap().is_none());
        }

        #[tokio::test]
        async fn test_clear_when_empty_is_ok() {
            let store = create_test_store().await;
            assert!(store.clear().await.is_ok());
        }

        #[tokio::test]
        async fn test_corrupt_value_is_a_miss() {
            let store = create_test_store().await;
            store.put_raw_value("{not json").await.unwrap();

            assert!(store.load().await.unwrap().is_none());
        }

        #[tokio::test]
        async fn test_stored_json_shape() {
            let store = create_test_store().await;
            store.store(&sample_cache(42, 1)).await.unwrap();

            let raw = store.raw_value().await.unwrap().unwrap();
            let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
            assert_eq!(json["timestamp"], 42);
            assert_eq!(json["stories"][0]["source"], "BBC");
        }

        #[tokio::test]
        async fn test_missing_table_is_storage_error() {
            let store = SqliteCacheStore::new("sqlite::memory:").await.unwrap();
            let result = store.load().await;
            assert!(matches!(result, Err(CacheError::Storage(_))));
        }
    }

    mod memory_tests {
        use super::*;

        #[tokio::test]
        async fn test_round_trip_and_clear() {
            let store = MemoryCacheStore::new();
            assert!(store.load().await.unwrap().is_none());

            let cache = sample_cache(7, 3);
            store.store(&cache).await.unwrap();
            assert_eq!(store.load().await.unwrap(), Some(cache));

            store.clear().await.unwrap();
            assert!(store.load().await.unwrap().is_none());
        }

        #[tokio::test]
        async fn test_corrupt_value_is_a_miss() {
            let store = MemoryCacheStore::new();
            store.put_raw_value("[]").await;
            assert!(store.load().await.unwrap().is_none());
        }
    }
}
