//! Session store trait

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::error::SessionError;
use crate::record::{SessionData, SessionMetadata, SessionRecord};

/// Zero-argument producer of unique session ids
pub type IdGenerator = Arc<dyn Fn() -> String + Send + Sync>;

/// Trait for session storage backends
///
/// The session manager only ever talks to a store through these five
/// operations. Implementations must be safe to call from many in-flight
/// requests at once and own any pooling, timeouts, or retries they need.
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    /// Install the generator used for new session ids.
    ///
    /// Called exactly once, when the store is handed to the session manager.
    fn set_id_generator(&mut self, generator: IdGenerator);

    /// Create and persist a new record with a fresh id
    async fn create(
        &self,
        data: SessionData,
        expires_at: Option<DateTime<Utc>>,
        metadata: SessionMetadata,
    ) -> Result<SessionRecord, SessionError>;

    /// Get a session by ID
    ///
    /// Returns `Ok(None)` when no record exists or when `id` is a sentinel
    /// value; errors are reserved for backend failures.
    async fn read(&self, id: &str) -> Result<Option<SessionRecord>, SessionError>;

    /// Store the full record under `id`, inserting it if absent.
    ///
    /// Returns false instead of failing.
    async fn update(&self, id: &str, record: &SessionRecord) -> bool;

    /// Delete the record stored under `id`.
    ///
    /// Deleting a missing record succeeds. Returns false instead of failing.
    async fn delete(&self, id: &str) -> bool;
}
