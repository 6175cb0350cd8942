//! Redis session store
//!
//! Storage format:
//! - Key: `prefix + session_id` (default prefix: "sess:")
//! - Value: JSON serialized [`SessionRecord`]
//! - TTL: the record's expiry plus a retention window, so abandoned sessions are
//!   reclaimed by Redis while expired ones can still be found and deleted by the
//!   session manager

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::sync::Arc;

use super::{IdGenerator, SessionStore};
use crate::config::default_id_generator;
use crate::error::SessionError;
use crate::record::{Expiry, SessionData, SessionMetadata, SessionRecord};
use crate::token::is_valid_session_id;

/// Redis session store
///
/// # Example
///
/// ```rust,ignore
/// use salvo_custom_session::RedisStore;
///
/// let client = redis::Client::open("redis://127.0.0.1/")?;
/// let store = RedisStore::new(client).await?;
/// ```
pub struct RedisStore {
    conn: Arc<ConnectionManager>,
    prefix: String,
    retention_secs: u64,
    id_generator: IdGenerator,
}

impl RedisStore {
    /// Create a new Redis store with default settings
    ///
    /// - Prefix: "sess:"
    /// - Retention after expiry: 3600 seconds
    pub async fn new(client: redis::Client) -> Result<Self, SessionError> {
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::from_connection_manager(conn))
    }

    /// Create a new Redis store from a connection string
    pub async fn from_url(url: &str) -> Result<Self, SessionError> {
        let client = redis::Client::open(url).map_err(|e| {
            SessionError::StoreUnavailable(format!("Failed to create Redis client: {}", e))
        })?;
        Self::new(client).await
    }

    /// Create a new Redis store from an existing connection manager
    pub fn from_connection_manager(conn: ConnectionManager) -> Self {
        Self {
            conn: Arc::new(conn),
            prefix: "sess:".to_string(),
            retention_secs: 3600,
            id_generator: default_id_generator(),
        }
    }

    /// Build with custom key prefix
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.to_string();
        self
    }

    /// Build with a custom retention window, in seconds past the record's expiry
    pub fn with_retention(mut self, secs: u64) -> Self {
        self.retention_secs = secs;
        self
    }

    /// Make a storage key from session ID
    fn make_key(&self, id: &str) -> String {
        format!("{}{}", self.prefix, id)
    }

    /// Seconds the key should live for, or None to keep it forever
    fn key_ttl(&self, expires_at: &Expiry) -> Option<u64> {
        expires_at.as_datetime().map(|at| {
            let remaining = (at - Utc::now()).num_seconds().max(0) as u64;
            (remaining + self.retention_secs).max(1)
        })
    }

    async fn write(&self, key: &str, record: &SessionRecord) -> Result<(), SessionError> {
        let json = serde_json::to_string(record)?;
        let mut conn = (*self.conn).clone();
        match self.key_ttl(&record.expires_at) {
            Some(ttl) => conn.set_ex::<_, _, ()>(key, json, ttl).await?,
            None => conn.set::<_, _, ()>(key, json).await?,
        }
        Ok(())
    }

    /// Remove every session under this store's prefix. Only meant for test harnesses.
    pub async fn clear(&self) -> Result<(), SessionError> {
        let mut conn = (*self.conn).clone();

        let pattern = format!("{}*", self.prefix);
        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(&pattern)
            .query_async(&mut conn)
            .await?;

        if !keys.is_empty() {
            conn.del::<_, ()>(keys).await?;
        }

        Ok(())
    }
}

impl Clone for RedisStore {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
            prefix: self.prefix.clone(),
            retention_secs: self.retention_secs,
            id_generator: Arc::clone(&self.id_generator),
        }
    }
}

#[async_trait]
impl SessionStore for RedisStore {
    fn set_id_generator(&mut self, generator: IdGenerator) {
        self.id_generator = generator;
    }

    async fn create(
        &self,
        data: SessionData,
        expires_at: Option<DateTime<Utc>>,
        metadata: SessionMetadata,
    ) -> Result<SessionRecord, SessionError> {
        let id = (self.id_generator)();
        if !is_valid_session_id(&id) {
            return Err(SessionError::InvalidSessionId(id));
        }

        let expires_at = expires_at.map_or(Expiry::Never, Expiry::At);
        let record = SessionRecord::new(id.clone(), data, expires_at, metadata, Utc::now());
        let key = self.make_key(&id);
        let json = serde_json::to_string(&record)?;
        let mut conn = (*self.conn).clone();

        // SET NX so a colliding id never overwrites another client's session
        let mut cmd = redis::cmd("SET");
        cmd.arg(&key).arg(&json).arg("NX");
        if let Some(ttl) = self.key_ttl(&record.expires_at) {
            cmd.arg("EX").arg(ttl);
        }
        let created: Option<String> = cmd.query_async(&mut conn).await?;

        match created {
            Some(_) => {
                tracing::trace!(session_id = %id, "created session");
                Ok(record)
            }
            None => Err(SessionError::CreateFailure(format!(
                "session id already in use: {}",
                id
            ))),
        }
    }

    async fn read(&self, id: &str) -> Result<Option<SessionRecord>, SessionError> {
        if !is_valid_session_id(id) {
            return Ok(None);
        }

        let key = self.make_key(id);
        let mut conn = (*self.conn).clone();
        let data: Option<String> = conn.get(&key).await?;

        match data {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, id: &str, record: &SessionRecord) -> bool {
        if !is_valid_session_id(id) {
            return false;
        }

        match self.write(&self.make_key(id), record).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(session_id = %id, "Failed to update session: {}", e);
                false
            }
        }
    }

    async fn delete(&self, id: &str) -> bool {
        if !is_valid_session_id(id) {
            return false;
        }

        let key = self.make_key(id);
        let mut conn = (*self.conn).clone();
        match conn.del::<_, ()>(&key).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(session_id = %id, "Failed to delete session: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    // Tests require a running Redis instance
    // Run with: cargo test --features redis-store -- --ignored

    use super::*;

    #[tokio::test]
    #[ignore]
    async fn test_redis_store_basic() {
        let mut store = RedisStore::from_url("redis://127.0.0.1/")
            .await
            .unwrap()
            .with_prefix("test-sess:");
        store.set_id_generator(Arc::new(|| uuid::Uuid::new_v4().to_string()));
        store.clear().await.unwrap();

        let mut data = SessionData::new();
        data.set("user", "alice");

        let expires = Utc::now() + chrono::Duration::seconds(3600);
        let created = store
            .create(data.clone(), Some(expires), SessionMetadata::default())
            .await
            .unwrap();

        let retrieved = store.read(&created.id).await.unwrap().unwrap();
        assert_eq!(retrieved.data, data);

        let mut changed = retrieved.clone();
        changed.data.set("user", "bob");
        assert!(store.update(&created.id, &changed).await);
        let retrieved = store.read(&created.id).await.unwrap().unwrap();
        assert_eq!(retrieved.data.get::<String>("user").as_deref(), Some("bob"));

        assert!(store.delete(&created.id).await);
        assert!(store.read(&created.id).await.unwrap().is_none());
        assert!(store.read("null").await.unwrap().is_none());
    }
}
