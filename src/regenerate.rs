//! Destroy-and-reissue planning
//!
//! Destroying a session swaps the request's bound record for a fresh tombstone
//! and deletes the original from the store. The swap is computed up front as a
//! [`DestroyPlan`] so the caller can apply it, then either keep it or roll it
//! back depending on whether the delete went through.

use chrono::{DateTime, Utc};

use crate::record::{Expiry, SessionData, SessionRecord};

/// Which cookie, if any, the response should carry for the session
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CookieAction {
    /// Leave the client's cookie alone
    #[default]
    Keep,
    /// Send a cookie carrying this session id
    Issue(String),
    /// Expire the client's cookie
    Clear,
}

/// The bound record and pending cookie for one request
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub record: SessionRecord,
    pub cookie: CookieAction,
}

/// A computed destroy: the state to install now and the state to restore on failure
#[derive(Debug, Clone)]
pub struct DestroyPlan {
    original: Binding,
    replacement: Binding,
    target: Option<String>,
}

impl DestroyPlan {
    /// Plan the destruction of `current`.
    ///
    /// `target` is the stored record to delete, if the store holds one for
    /// this client; it need not match the bound record's id. The replacement
    /// carries `fresh_id`, the initial data, and the destroyed expiry sentinel,
    /// so it is never persisted. Metadata is kept for logging.
    pub fn new(
        current: &Binding,
        target: Option<String>,
        fresh_id: String,
        initial: &SessionData,
        now: DateTime<Utc>,
    ) -> Self {
        let replacement = Binding {
            record: SessionRecord::new(
                fresh_id,
                initial.clone(),
                Expiry::Destroyed,
                current.record.metadata.clone(),
                now,
            ),
            cookie: CookieAction::Clear,
        };
        Self {
            original: current.clone(),
            replacement,
            target,
        }
    }

    /// Id of the record that has to be deleted from the store, if any
    pub fn target_id(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// State to bind while the delete is in flight and after it succeeds
    pub fn commit(&self) -> Binding {
        self.replacement.clone()
    }

    /// State to bind when the delete failed: the original record, with its
    /// cookie sent again in case the client already dropped it.
    ///
    /// A bound record living under a different id than the target was never
    /// announced to the client, so its original cookie action is kept.
    pub fn rollback(self) -> Binding {
        let cookie = match self.target {
            Some(target) if target == self.original.record.id => CookieAction::Issue(target),
            _ => self.original.cookie,
        };
        Binding {
            record: self.original.record,
            cookie,
        }
    }
}
