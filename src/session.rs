//! Per-request session handle

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::config::SessionConfig;
use crate::record::{Expiry, SessionData, SessionMetadata, SessionRecord};
use crate::regenerate::{Binding, CookieAction, DestroyPlan};
use crate::store::SessionStore;
use crate::token::IncomingCookie;

/// How the bound session came to be
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Origin {
    /// Loaded from the store under the id in the request cookie
    Restored,
    /// A new id was issued to the client during this request.
    /// `persisted` tells whether the store already holds the record.
    Issued { id: String, persisted: bool },
    /// Local only: never written and never announced to the client
    Detached,
}

pub(crate) struct SessionState {
    pub incoming: IncomingCookie,
    pub origin: Origin,
    pub binding: Binding,
}

impl SessionState {
    /// Id of the record the store may hold for this client.
    ///
    /// A detached session still points at the cookie's id: the read failed,
    /// so the record may well exist.
    fn stored_id(&self) -> Option<String> {
        match &self.origin {
            Origin::Restored | Origin::Detached => self.incoming.session_id(),
            Origin::Issued { id, persisted } => persisted.then(|| id.clone()),
        }
    }
}

/// Session bound to one request
///
/// Clones share state, so the middleware and the handler see the same data.
/// Changes are written back by the session manager after the handler returns,
/// and only when the data differs from what the store holds.
#[derive(Clone)]
pub struct Session {
    state: Arc<RwLock<SessionState>>,
    store: Arc<dyn SessionStore>,
    config: Arc<SessionConfig>,
}

impl Session {
    pub(crate) fn new(
        state: SessionState,
        store: Arc<dyn SessionStore>,
        config: Arc<SessionConfig>,
    ) -> Self {
        Self {
            state: Arc::new(RwLock::new(state)),
            store,
            config,
        }
    }

    /// Get the session ID
    pub fn id(&self) -> String {
        self.state.read().binding.record.id.clone()
    }

    /// Check if this session was not loaded from the store: it was issued
    /// during this request, or it is detached
    pub fn is_new(&self) -> bool {
        !matches!(self.state.read().origin, Origin::Restored)
    }

    /// Check if the session only lives in memory because the store failed
    pub fn is_detached(&self) -> bool {
        matches!(self.state.read().origin, Origin::Detached)
    }

    /// Check if the store holds a record for this session
    pub fn is_persisted(&self) -> bool {
        match &self.state.read().origin {
            Origin::Restored => true,
            Origin::Issued { persisted, .. } => *persisted,
            Origin::Detached => false,
        }
    }

    /// Check if [`Session::destroy`] succeeded during this request
    pub fn is_destroyed(&self) -> bool {
        self.state.read().binding.record.expires_at.is_destroyed()
    }

    /// Get a value from the session
    pub fn get<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        self.state.read().binding.record.data.get(key)
    }

    /// Set a value in the session
    pub fn set<T: Serialize>(&self, key: &str, value: T) {
        self.state.write().binding.record.data.set(key, value);
    }

    /// Remove a value from the session
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.state.write().binding.record.data.remove(key)
    }

    /// Check if a key exists in the session
    pub fn contains(&self, key: &str) -> bool {
        self.state.read().binding.record.data.contains(key)
    }

    /// Clear all session data
    pub fn clear(&self) {
        self.state.write().binding.record.data.clear();
    }

    /// Mutate the session data in place
    pub fn update_data<R>(&self, f: impl FnOnce(&mut SessionData) -> R) -> R {
        f(&mut self.state.write().binding.record.data)
    }

    /// Get a copy of the session data
    pub fn data(&self) -> SessionData {
        self.state.read().binding.record.data.clone()
    }

    /// Get a copy of the bound record
    pub fn record(&self) -> SessionRecord {
        self.state.read().binding.record.clone()
    }

    /// Expiry of the bound record
    pub fn expires_at(&self) -> Expiry {
        self.state.read().binding.record.expires_at
    }

    /// Request details captured when the session was created
    pub fn metadata(&self) -> SessionMetadata {
        self.state.read().binding.record.metadata.clone()
    }

    /// Cookie the response should carry for this session
    pub fn cookie_action(&self) -> CookieAction {
        self.state.read().binding.cookie.clone()
    }

    /// Destroy the session.
    ///
    /// On success the request is rebound to an empty session that will not be
    /// persisted, the client's cookie is cleared and the client's record is
    /// gone from the store. If the store refuses the delete, the original
    /// session and its cookie are restored and `false` is returned.
    ///
    /// The record deleted is the one the client's cookie points at, or the one
    /// issued this request; a session the store never saw is only swapped.
    pub async fn destroy(&self) -> bool {
        let plan = {
            let mut state = self.state.write();
            if state.binding.record.expires_at.is_destroyed() {
                return true;
            }
            let plan = DestroyPlan::new(
                &state.binding,
                state.stored_id(),
                self.config.generate_id(),
                &self.config.initial_session,
                self.config.now(),
            );
            state.binding = plan.commit();
            plan
        };

        let Some(target) = plan.target_id() else {
            tracing::debug!("destroyed session that was never stored");
            return true;
        };

        if self.store.delete(target).await {
            tracing::debug!(session_id = %target, "destroyed session");
            true
        } else {
            tracing::error!(session_id = %target, "Failed to destroy session, restoring it");
            self.state.write().binding = plan.rollback();
            false
        }
    }

    /// Id to persist under and the record to persist, if this session should
    /// be written back at all.
    ///
    /// The id comes from the request cookie or from the id issued this
    /// request, never from the record the handler had access to.
    pub(crate) fn persist_target(&self) -> Option<(String, SessionRecord)> {
        let state = self.state.read();
        if state.binding.record.expires_at.is_destroyed() {
            return None;
        }
        let id = match &state.origin {
            Origin::Restored => state.incoming.session_id()?,
            Origin::Issued { id, .. } => id.clone(),
            Origin::Detached => return None,
        };
        Some((id, state.binding.record.clone()))
    }

    pub(crate) fn mark_persisted(&self, record: &SessionRecord) {
        let mut state = self.state.write();
        if state.binding.record.id == record.id {
            state.binding.record.updated_at = record.updated_at;
        }
        if let Origin::Issued { persisted, .. } = &mut state.origin {
            *persisted = true;
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("Session")
            .field("record", &state.binding.record)
            .field("cookie", &state.binding.cookie)
            .field("origin", &state.origin)
            .finish()
    }
}
