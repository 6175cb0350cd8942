//! Session token resolution from raw cookie values
//!
//! A cookie carries either a bare session id (`<id>`) or a signed one
//! (`<id>.<signature>`). Only the part before the first `.` is ever used as the
//! id; checking the signature is left to [`crate::cookie_signature`], which the
//! middleware runs before this module sees the value.

/// Values that must never be used as a lookup key
pub const SENTINEL_IDS: [&str; 4] = ["", "undefined", "null", "__proto__"];

/// Separates the id from its signature in a cookie value
pub const SIGNATURE_SEPARATOR: char = '.';

/// Returns true when `id` may be used to look up a session record.
///
/// Ids containing the signature separator are refused: the cookie would
/// resolve to a different id than the one stored.
pub fn is_valid_session_id(id: &str) -> bool {
    !SENTINEL_IDS.contains(&id.trim()) && !id.contains(SIGNATURE_SEPARATOR)
}

/// A cookie value split into its id and optional signature part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    /// Everything before the first `.`
    pub id: String,
    /// Everything after the first `.`, when present
    pub signature: Option<String>,
}

/// Split a raw cookie value on its first `.`.
///
/// Never fails: a value without a separator is an unsigned id.
pub fn parse_cookie_value(raw: &str) -> SessionToken {
    match raw.split_once(SIGNATURE_SEPARATOR) {
        Some((id, signature)) => SessionToken {
            id: id.to_string(),
            signature: Some(signature.to_string()),
        },
        None => SessionToken {
            id: raw.to_string(),
            signature: None,
        },
    }
}

/// Resolve a session id from a raw cookie value.
///
/// Returns `None` when the cookie is absent or when the id part is a sentinel.
pub fn resolve_session_id(raw: Option<&str>) -> Option<String> {
    let token = parse_cookie_value(raw?);
    if is_valid_session_id(&token.id) {
        Some(token.id)
    } else {
        None
    }
}

/// What the request carried in the session cookie
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum IncomingCookie {
    /// No session cookie at all
    #[default]
    Absent,
    /// A cookie value, already percent-decoded
    Value(String),
    /// A cookie whose signature did not verify; it never yields an id
    Rejected,
}

impl IncomingCookie {
    /// Build from an optional raw cookie value, percent-decoding it
    pub fn from_raw(raw: Option<&str>) -> Self {
        match raw {
            Some(value) => {
                let decoded = match urlencoding::decode(value) {
                    Ok(d) => d.into_owned(),
                    Err(_) => value.to_string(),
                };
                IncomingCookie::Value(decoded)
            }
            None => IncomingCookie::Absent,
        }
    }

    /// Check if no cookie was sent
    pub fn is_absent(&self) -> bool {
        matches!(self, IncomingCookie::Absent)
    }

    /// The session id this cookie resolves to, if any
    pub fn session_id(&self) -> Option<String> {
        match self {
            IncomingCookie::Value(value) => resolve_session_id(Some(value)),
            IncomingCookie::Absent | IncomingCookie::Rejected => None,
        }
    }
}
