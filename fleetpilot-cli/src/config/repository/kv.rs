//! Key/value repository backing view state and session data

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::SqlitePool;
use tokio::sync::RwLock;

/// Storage scope of a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Survives logout (view preferences)
    Local,
    /// Cleared on logout (token, user, selection)
    Session,
}

impl Namespace {
    pub fn as_str(self) -> &'static str {
        match self {
            Namespace::Local => "local",
            Namespace::Session => "session",
        }
    }
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, namespace: Namespace, key: &str) -> Result<Option<String>>;
    async fn set(&self, namespace: Namespace, key: &str, value: &str) -> Result<()>;
    async fn remove(&self, namespace: Namespace, key: &str) -> Result<()>;
    async fn clear(&self, namespace: Namespace) -> Result<()>;
}

/// SQLite-backed store
#[derive(Debug, Clone)]
pub struct SqliteKvStore {
    pool: SqlitePool,
}

impl SqliteKvStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KeyValueStore for SqliteKvStore {
    async fn get(&self, namespace: Namespace, key: &str) -> Result<Option<String>> {
        get_value(&self.pool, namespace, key).await
    }

    async fn set(&self, namespace: Namespace, key: &str, value: &str) -> Result<()> {
        set_value(&self.pool, namespace, key, value).await
    }

    async fn remove(&self, namespace: Namespace, key: &str) -> Result<()> {
        delete_value(&self.pool, namespace, key).await
    }

    async fn clear(&self, namespace: Namespace) -> Result<()> {
        clear_namespace(&self.pool, namespace).await
    }
}

/// Get a stored value
pub async fn get_value(pool: &SqlitePool, namespace: Namespace, key: &str) -> Result<Option<String>> {
    let row: Option<(String,)> =
        sqlx::query_as("SELECT value FROM kv_store WHERE namespace = ? AND key = ?")
            .bind(namespace.as_str())
            .bind(key)
            .fetch_optional(pool)
            .await
            .context("Failed to read stored value")?;

    Ok(row.map(|(value,)| value))
}

/// Insert or replace a value
pub async fn set_value(pool: &SqlitePool, namespace: Namespace, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO kv_store (namespace, key, value, updated_at)
         VALUES (?, ?, ?, datetime('now'))
         ON CONFLICT(namespace, key)
         DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
    )
    .bind(namespace.as_str())
    .bind(key)
    .bind(value)
    .execute(pool)
    .await
    .context("Failed to store value")?;

    Ok(())
}

/// Delete a value
pub async fn delete_value(pool: &SqlitePool, namespace: Namespace, key: &str) -> Result<()> {
    sqlx::query("DELETE FROM kv_store WHERE namespace = ? AND key = ?")
        .bind(namespace.as_str())
        .bind(key)
        .execute(pool)
        .await
        .context("Failed to delete stored value")?;

    Ok(())
}

/// Delete every value of a namespace
pub async fn clear_namespace(pool: &SqlitePool, namespace: Namespace) -> Result<()> {
    sqlx::query("DELETE FROM kv_store WHERE namespace = ?")
        .bind(namespace.as_str())
        .execute(pool)
        .await
        .context("Failed to clear stored values")?;

    Ok(())
}

/// Process-local store, used in tests and when the database is unavailable
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    values: RwLock<HashMap<(Namespace, String), String>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKvStore {
    async fn get(&self, namespace: Namespace, key: &str) -> Result<Option<String>> {
        Ok(self
            .values
            .read()
            .await
            .get(&(namespace, key.to_string()))
            .cloned())
    }

    async fn set(&self, namespace: Namespace, key: &str, value: &str) -> Result<()> {
        self.values
            .write()
            .await
            .insert((namespace, key.to_string()), value.to_string());
        Ok(())
    }

    async fn remove(&self, namespace: Namespace, key: &str) -> Result<()> {
        self.values.write().await.remove(&(namespace, key.to_string()));
        Ok(())
    }

    async fn clear(&self, namespace: Namespace) -> Result<()> {
        self.values.write().await.retain(|(ns, _), _| *ns != namespace);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::repository::connect_memory;

    async fn exercise(store: &dyn KeyValueStore) {
        assert_eq!(store.get(Namespace::Local, "a").await.unwrap(), None);

        store.set(Namespace::Local, "a", "1").await.unwrap();
        store.set(Namespace::Local, "a", "2").await.unwrap();
        store.set(Namespace::Session, "a", "s").await.unwrap();
        store.set(Namespace::Session, "b", "t").await.unwrap();

        assert_eq!(store.get(Namespace::Local, "a").await.unwrap().as_deref(), Some("2"));
        assert_eq!(store.get(Namespace::Session, "a").await.unwrap().as_deref(), Some("s"));

        store.remove(Namespace::Session, "b").await.unwrap();
        assert_eq!(store.get(Namespace::Session, "b").await.unwrap(), None);

        store.clear(Namespace::Session).await.unwrap();
        assert_eq!(store.get(Namespace::Session, "a").await.unwrap(), None);
        assert_eq!(store.get(Namespace::Local, "a").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_memory_store() {
        exercise(&MemoryKvStore::new()).await;
    }

    #[tokio::test]
    async fn test_sqlite_store() {
        let pool = connect_memory().await.unwrap();
        exercise(&SqliteKvStore::new(pool)).await;
    }
}
