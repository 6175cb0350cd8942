//! In-memory session store
//!
//! The reference implementation of [`SessionStore`], primarily for development
//! and testing. For production, use RedisStore, PostgresStore, or another
//! persistent store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use super::{IdGenerator, SessionStore};
use crate::config::default_id_generator;
use crate::error::SessionError;
use crate::record::{Expiry, SessionData, SessionMetadata, SessionRecord};
use crate::token::is_valid_session_id;

/// In-memory session store
///
/// Clones share the same underlying map, so a test can keep a handle while the
/// session manager owns another.
///
/// Warning: This store is not suitable for production use because:
/// - Sessions are lost on server restart
/// - Sessions are not shared across multiple server instances
/// - Expired sessions are only removed when a request reads them
pub struct MemoryStore {
    sessions: Arc<RwLock<HashMap<String, SessionRecord>>>,
    id_generator: IdGenerator,
}

impl MemoryStore {
    /// Create a new memory store
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            id_generator: default_id_generator(),
        }
    }

    /// Remove every session. Only meant for test harnesses.
    pub fn clear(&self) {
        self.sessions.write().clear();
    }

    /// Number of stored sessions, expired ones included
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Check if the store holds no sessions
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MemoryStore {
    fn clone(&self) -> Self {
        Self {
            sessions: Arc::clone(&self.sessions),
            id_generator: Arc::clone(&self.id_generator),
        }
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
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

        let mut sessions = self.sessions.write();
        if sessions.contains_key(&id) {
            return Err(SessionError::CreateFailure(format!(
                "session id already in use: {}",
                id
            )));
        }
        sessions.insert(id.clone(), record.clone());
        tracing::trace!(session_id = %id, "created session");
        Ok(record)
    }

    async fn read(&self, id: &str) -> Result<Option<SessionRecord>, SessionError> {
        if !is_valid_session_id(id) {
            return Ok(None);
        }
        Ok(self.sessions.read().get(id).cloned())
    }

    async fn update(&self, id: &str, record: &SessionRecord) -> bool {
        if !is_valid_session_id(id) {
            return false;
        }
        self.sessions.write().insert(id.to_string(), record.clone());
        tracing::trace!(session_id = %id, "updated session");
        true
    }

    async fn delete(&self, id: &str) -> bool {
        if !is_valid_session_id(id) {
            return false;
        }
        self.sessions.write().remove(id);
        tracing::trace!(session_id = %id, "deleted session");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_generator() -> IdGenerator {
        let counter = Arc::new(AtomicUsize::new(0));
        Arc::new(move || format!("sid-{}", counter.fetch_add(1, Ordering::SeqCst)))
    }

    #[tokio::test]
    async fn test_memory_store_basic() {
        let mut store = MemoryStore::new();
        store.set_id_generator(counting_generator());

        let mut data = SessionData::new();
        data.set("user", "alice");

        let created = store
            .create(data.clone(), None, SessionMetadata::default())
            .await
            .unwrap();
        assert_eq!(created.id, "sid-0");
        assert_eq!(created.expires_at, Expiry::Never);

        let retrieved = store.read("sid-0").await.unwrap().unwrap();
        assert_eq!(retrieved.data, data);

        let mut changed = retrieved.clone();
        changed.data.set("user", "bob");
        assert!(store.update("sid-0", &changed).await);
        let retrieved = store.read("sid-0").await.unwrap().unwrap();
        assert_eq!(retrieved.data.get::<String>("user").as_deref(), Some("bob"));

        assert!(store.delete("sid-0").await);
        assert!(store.read("sid-0").await.unwrap().is_none());
        assert!(store.delete("sid-0").await);
    }

    #[tokio::test]
    async fn test_read_missing_and_sentinel_ids() {
        let store = MemoryStore::new();
        for id in ["missing", "", "undefined", "null", "__proto__"] {
            assert!(store.read(id).await.unwrap().is_none());
        }
        assert!(!store.delete("__proto__").await);
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_ids() {
        let mut store = MemoryStore::new();
        store.set_id_generator(Arc::new(|| "fixed".to_string()));

        store
            .create(SessionData::new(), None, SessionMetadata::default())
            .await
            .unwrap();
        let second = store
            .create(SessionData::new(), None, SessionMetadata::default())
            .await;
        assert!(matches!(second, Err(SessionError::CreateFailure(_))));
    }

    #[tokio::test]
    async fn test_expired_records_are_returned_as_stored() {
        let mut store = MemoryStore::new();
        store.set_id_generator(counting_generator());
        let past = Utc::now() - chrono::Duration::seconds(10);

        let created = store
            .create(
                SessionData::from_value(json!({"a": 1})).unwrap(),
                Some(past),
                SessionMetadata::default(),
            )
            .await
            .unwrap();
        let read = store.read(&created.id).await.unwrap().unwrap();
        assert!(read.is_expired_at(Utc::now()));
    }

    #[tokio::test]
    async fn test_clear_and_shared_clones() {
        let store = MemoryStore::new();
        let handle = store.clone();
        store
            .create(SessionData::new(), None, SessionMetadata::default())
            .await
            .unwrap();
        assert_eq!(handle.len(), 1);

        handle.clear();
        assert!(store.is_empty());
    }
}
