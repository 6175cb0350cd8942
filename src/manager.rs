//! Session lifecycle: resolve a session when a request arrives, persist it
//! when the request is done.
//!
//! The manager is framework independent. [`crate::handler::SessionHandler`]
//! drives it from Salvo; anything else that can hand over a cookie value and
//! apply a [`CookieAction`](crate::regenerate::CookieAction) can do the same.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::config::SessionConfig;
use crate::record::{SessionMetadata, SessionRecord};
use crate::regenerate::{Binding, CookieAction};
use crate::session::{Origin, Session, SessionState};
use crate::store::SessionStore;
use crate::token::{is_valid_session_id, IncomingCookie};

/// Result of the persist phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    /// Nothing to persist: destroyed, detached, or no usable id
    Skipped,
    /// Data matched the stored copy, no write issued
    Unchanged,
    /// The store accepted the update
    Written,
    /// The store rejected the update
    Failed,
}

/// Drives session resolution and persistence against a [`SessionStore`]
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    config: Arc<SessionConfig>,
}

impl SessionManager {
    /// Bind a store to a configuration.
    ///
    /// This is where the store receives the configured id generator.
    pub fn new<S: SessionStore>(mut store: S, config: SessionConfig) -> Self {
        store.set_id_generator(config.id_generator());
        Self {
            store: Arc::new(store),
            config: Arc::new(config),
        }
    }

    /// The configuration this manager runs with
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Resolve the session for an incoming request.
    ///
    /// Always returns a session; store failures are logged and leave the
    /// request with a local one.
    pub async fn resolve(&self, incoming: IncomingCookie, metadata: SessionMetadata) -> Session {
        let now = self.config.now();

        let (binding, origin) = if incoming.is_absent() {
            self.create(metadata, now).await
        } else {
            match incoming.session_id() {
                Some(id) => self.restore(&id, metadata, now).await,
                None => {
                    tracing::debug!("session cookie carries no usable id, issuing a new one");
                    self.deferred(metadata, now)
                }
            }
        };

        Session::new(
            SessionState {
                incoming,
                origin,
                binding,
            },
            Arc::clone(&self.store),
            Arc::clone(&self.config),
        )
    }

    /// Write the session back if its data changed.
    pub async fn persist(&self, session: &Session) -> PersistOutcome {
        let Some((id, current)) = session.persist_target() else {
            return PersistOutcome::Skipped;
        };

        let previous = match self.store.read(&id).await {
            Ok(previous) => previous,
            Err(e) => {
                tracing::error!(session_id = %id, "Failed to load previous session: {}", e);
                None
            }
        };

        if let Some(previous) = &previous {
            if previous.data.canonical_json() == current.data.canonical_json() {
                tracing::debug!(session_id = %id, "session unchanged, skipping write");
                return PersistOutcome::Unchanged;
            }
        }

        let updated_at = previous
            .as_ref()
            .map_or(current.updated_at, |p| p.updated_at.max(current.updated_at))
            .max(self.config.now());
        let next = SessionRecord {
            id: id.clone(),
            updated_at,
            ..current
        };

        if self.store.update(&id, &next).await {
            session.mark_persisted(&next);
            PersistOutcome::Written
        } else {
            tracing::error!(session_id = %id, "Failed to save session");
            PersistOutcome::Failed
        }
    }

    async fn create(&self, metadata: SessionMetadata, now: DateTime<Utc>) -> (Binding, Origin) {
        let expires_at = self.config.expiry_from(now);
        let created = self
            .store
            .create(
                self.config.initial_session.clone(),
                expires_at.as_datetime(),
                metadata.clone(),
            )
            .await;

        match created {
            Ok(mut record) => {
                record.data.merge_defaults(&self.config.initial_session);
                let id = record.id.clone();
                tracing::debug!(session_id = %id, "created session");
                (
                    Binding {
                        record,
                        cookie: CookieAction::Issue(id.clone()),
                    },
                    Origin::Issued {
                        id,
                        persisted: true,
                    },
                )
            }
            Err(e) => {
                tracing::error!("Failed to create session: {}", e);
                self.detached(metadata, now)
            }
        }
    }

    async fn restore(
        &self,
        id: &str,
        metadata: SessionMetadata,
        now: DateTime<Utc>,
    ) -> (Binding, Origin) {
        match self.store.read(id).await {
            Ok(Some(record)) if record.is_expired_at(now) => {
                if !self.store.delete(id).await {
                    tracing::error!(session_id = %id, "Failed to delete expired session");
                }
                tracing::debug!(session_id = %id, "session expired");
                self.deferred(metadata, now)
            }
            Ok(Some(mut record)) => {
                record.data.merge_defaults(&self.config.initial_session);
                (
                    Binding {
                        record,
                        cookie: CookieAction::Keep,
                    },
                    Origin::Restored,
                )
            }
            Ok(None) => {
                tracing::debug!(session_id = %id, "session not found");
                self.deferred(metadata, now)
            }
            Err(e) => {
                tracing::error!(session_id = %id, "Failed to load session: {}", e);
                self.detached(metadata, now)
            }
        }
    }

    /// A new session that the persist phase will create under a fresh id
    fn deferred(&self, metadata: SessionMetadata, now: DateTime<Utc>) -> (Binding, Origin) {
        let record = self.local_record(metadata, now);
        if !is_valid_session_id(&record.id) {
            tracing::error!(
                session_id = %record.id,
                "id generator produced an unusable session id"
            );
            return (
                Binding {
                    record,
                    cookie: CookieAction::Keep,
                },
                Origin::Detached,
            );
        }
        let id = record.id.clone();
        (
            Binding {
                record,
                cookie: CookieAction::Issue(id.clone()),
            },
            Origin::Issued {
                id,
                persisted: false,
            },
        )
    }

    /// A new session that is never written and never sent to the client
    fn detached(&self, metadata: SessionMetadata, now: DateTime<Utc>) -> (Binding, Origin) {
        (
            Binding {
                record: self.local_record(metadata, now),
                cookie: CookieAction::Keep,
            },
            Origin::Detached,
        )
    }

    fn local_record(&self, metadata: SessionMetadata, now: DateTime<Utc>) -> SessionRecord {
        SessionRecord::new(
            self.config.generate_id(),
            self.config.initial_session.clone(),
            self.config.expiry_from(now),
            metadata,
            now,
        )
    }
}
