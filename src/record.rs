//! Durable session record and its parts

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::net::IpAddr;

use crate::error::SessionError;

/// Wire value reserved for a destroyed session's expiry
pub const DESTROYED_EXPIRY_MILLIS: i64 = -1;

/// User agent recorded when the request did not send one
pub const UNKNOWN_USER_AGENT: &str = "<not-set>";

/// When a session stops being valid
///
/// Serialized as epoch milliseconds: `null` for [`Expiry::Never`] and the
/// reserved `-1` for [`Expiry::Destroyed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expiry {
    /// The session never expires
    #[default]
    Never,
    /// The session expires at this instant
    At(DateTime<Utc>),
    /// The session was destroyed during this request and must not be persisted
    Destroyed,
}

impl Expiry {
    /// Check whether the session is no longer valid at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self {
            Expiry::Never => false,
            Expiry::At(at) => now >= *at,
            Expiry::Destroyed => true,
        }
    }

    /// Check for the destroyed sentinel
    pub fn is_destroyed(&self) -> bool {
        matches!(self, Expiry::Destroyed)
    }

    /// The expiry instant, if there is one
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Expiry::At(at) => Some(*at),
            Expiry::Never | Expiry::Destroyed => None,
        }
    }

    /// Encode as epoch milliseconds
    pub fn to_epoch_millis(&self) -> Option<i64> {
        match self {
            Expiry::Never => None,
            Expiry::At(at) => Some(at.timestamp_millis()),
            Expiry::Destroyed => Some(DESTROYED_EXPIRY_MILLIS),
        }
    }

    /// Decode from epoch milliseconds
    pub fn from_epoch_millis(millis: Option<i64>) -> Result<Self, SessionError> {
        match millis {
            None => Ok(Expiry::Never),
            Some(DESTROYED_EXPIRY_MILLIS) => Ok(Expiry::Destroyed),
            Some(ms) => DateTime::from_timestamp_millis(ms)
                .map(Expiry::At)
                .ok_or_else(|| SessionError::InvalidData(format!("expiry out of range: {}", ms))),
        }
    }
}

impl Serialize for Expiry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_epoch_millis().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Expiry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let millis = Option::<i64>::deserialize(deserializer)?;
        Expiry::from_epoch_millis(millis).map_err(D::Error::custom)
    }
}

/// Session payload: a JSON object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionData(Map<String, Value>);

impl SessionData {
    /// Create empty session data
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON value, which must be an object
    pub fn from_value(value: Value) -> Result<Self, SessionError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(SessionError::InvalidData(format!(
                "session data must be an object, got {}",
                other
            ))),
        }
    }

    /// Build from any serializable value that serializes to an object
    pub fn from_serializable<T: Serialize>(value: &T) -> Result<Self, SessionError> {
        Self::from_value(serde_json::to_value(value)?)
    }

    /// Get a value from session data
    pub fn get<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        self.0
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Get the raw JSON value for a key
    pub fn get_value(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Set a value in session data
    pub fn set<T: Serialize>(&mut self, key: &str, value: T) {
        if let Ok(v) = serde_json::to_value(value) {
            self.0.insert(key.to_string(), v);
        }
    }

    /// Remove a value from session data
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Check if a key exists
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Clear all session data
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Check if session data is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Backfill top-level keys missing here from `defaults`.
    ///
    /// Existing keys win, even when their value is `null`.
    pub fn merge_defaults(&mut self, defaults: &SessionData) {
        for (key, value) in &defaults.0 {
            if !self.0.contains_key(key) {
                self.0.insert(key.clone(), value.clone());
            }
        }
    }

    /// Canonical JSON form used to detect changes.
    ///
    /// Keys are emitted in sorted order, so two payloads with equal content
    /// always produce the same string.
    pub fn canonical_json(&self) -> String {
        let sorted: std::collections::BTreeMap<&String, &Value> = self.0.iter().collect();
        // Nested objects keep serde_json's map ordering, which is sorted unless
        // `preserve_order` is enabled somewhere in the dependency graph.
        serde_json::to_string(&sorted).unwrap_or_default()
    }

    /// Borrow the underlying map
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for SessionData {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<SessionData> for Value {
    fn from(data: SessionData) -> Self {
        Value::Object(data.0)
    }
}

/// Request details captured when a session is created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    /// First non-loopback client address seen for the request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_address: Option<String>,
    /// User agent header, or `<not-set>`
    pub user_agent: String,
}

impl Default for SessionMetadata {
    fn default() -> Self {
        Self {
            client_address: None,
            user_agent: UNKNOWN_USER_AGENT.to_string(),
        }
    }
}

impl SessionMetadata {
    /// Detect metadata from request parts.
    ///
    /// `forwarded_for` is an `X-Forwarded-For` style list; its entries are
    /// considered before the peer address. `127.0.0.1` is never recorded.
    pub fn detect(
        forwarded_for: Option<&str>,
        peer: Option<IpAddr>,
        user_agent: Option<&str>,
    ) -> Self {
        let client_address = forwarded_for
            .into_iter()
            .flat_map(|list| list.split(','))
            .map(|addr| addr.trim().to_string())
            .chain(peer.map(|ip| ip.to_string()))
            .find(|addr| !addr.is_empty() && addr != "127.0.0.1");

        let user_agent = match user_agent.map(str::trim) {
            Some(ua) if !ua.is_empty() => ua.to_string(),
            _ => UNKNOWN_USER_AGENT.to_string(),
        };

        Self {
            client_address,
            user_agent,
        }
    }
}

/// A session as stored by a [`SessionStore`](crate::store::SessionStore)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// Unique id within the store
    pub id: String,
    /// Creation time
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    /// Last persisted change
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
    /// Expiry
    pub expires_at: Expiry,
    /// Application payload
    pub data: SessionData,
    /// Request details captured at creation
    pub metadata: SessionMetadata,
}

impl SessionRecord {
    /// Build a record created at `now`
    pub fn new(
        id: String,
        data: SessionData,
        expires_at: Expiry,
        metadata: SessionMetadata,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            created_at: now,
            updated_at: now,
            expires_at,
            data,
            metadata,
        }
    }

    /// Check if the record has expired at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_expired_at(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn data(value: Value) -> SessionData {
        SessionData::from_value(value).unwrap()
    }

    #[test]
    fn test_expiry_wire_format() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(serde_json::to_value(Expiry::Never).unwrap(), Value::Null);
        assert_eq!(serde_json::to_value(Expiry::Destroyed).unwrap(), json!(-1));
        assert_eq!(
            serde_json::to_value(Expiry::At(at)).unwrap(),
            json!(at.timestamp_millis())
        );

        let back: Expiry = serde_json::from_value(json!(-1)).unwrap();
        assert_eq!(back, Expiry::Destroyed);
        let back: Expiry = serde_json::from_value(json!(at.timestamp_millis())).unwrap();
        assert_eq!(back, Expiry::At(at));
    }

    #[test]
    fn test_expiry_boundaries() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 30).unwrap();
        let expiry = Expiry::At(at);
        assert!(!expiry.is_expired_at(at - chrono::Duration::seconds(1)));
        assert!(expiry.is_expired_at(at));
        assert!(!Expiry::Never.is_expired_at(at));
        assert!(Expiry::Destroyed.is_expired_at(at));
    }

    #[test]
    fn test_merge_defaults_backfills_missing_keys_only() {
        let mut restored = data(json!({"user": "alice", "theme": null}));
        let defaults = data(json!({"user": "<unset>", "theme": "dark", "visits": 0}));
        restored.merge_defaults(&defaults);

        assert_eq!(restored.get::<String>("user").as_deref(), Some("alice"));
        assert_eq!(restored.get_value("theme"), Some(&Value::Null));
        assert_eq!(restored.get::<i64>("visits"), Some(0));
    }

    #[test]
    fn test_canonical_json_ignores_insertion_order() {
        let mut a = SessionData::new();
        a.set("b", 2);
        a.set("a", json!({"y": 1, "x": 2}));
        let mut b = SessionData::new();
        b.set("a", json!({"x": 2, "y": 1}));
        b.set("b", 2);
        assert_eq!(a.canonical_json(), b.canonical_json());

        b.set("b", 3);
        assert_ne!(a.canonical_json(), b.canonical_json());
    }

    #[test]
    fn test_from_value_rejects_non_objects() {
        assert!(SessionData::from_value(json!([1, 2])).is_err());
        assert!(SessionData::from_value(json!("text")).is_err());
    }

    #[test]
    fn test_detect_metadata() {
        let meta = SessionMetadata::detect(
            Some("127.0.0.1, 203.0.113.7"),
            Some("10.0.0.1".parse().unwrap()),
            Some("curl/8.0"),
        );
        assert_eq!(meta.client_address.as_deref(), Some("203.0.113.7"));
        assert_eq!(meta.user_agent, "curl/8.0");

        let meta = SessionMetadata::detect(None, Some("127.0.0.1".parse().unwrap()), Some("  "));
        assert_eq!(meta.client_address, None);
        assert_eq!(meta.user_agent, UNKNOWN_USER_AGENT);
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let record = SessionRecord::new(
            "sid".to_string(),
            data(json!({"views": 1})),
            Expiry::Never,
            SessionMetadata::default(),
            now,
        );
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["createdAt"], json!(now.timestamp_millis()));
        assert_eq!(value["expiresAt"], Value::Null);
        assert_eq!(value["metadata"]["userAgent"], json!(UNKNOWN_USER_AGENT));

        let back: SessionRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }
}
