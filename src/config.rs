//! Session configuration

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::record::{Expiry, SessionData};
use crate::store::IdGenerator;

/// Source of the current time, injectable for deterministic expiry tests
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Seconds the cookie's max-age is kept below the session ttl
pub const COOKIE_TTL_MARGIN_SECS: u64 = 60;

/// Longest ttl or cookie max age honoured, in seconds (100 years).
/// Larger values are clamped to it.
pub const MAX_TTL_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// Default id generator: a random UUID v4
pub fn default_id_generator() -> IdGenerator {
    Arc::new(|| uuid::Uuid::new_v4().to_string())
}

fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

/// SameSite cookie attribute
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    /// Strict - cookie only sent for same-site requests
    Strict,
    /// Lax - cookie sent for same-site requests and top-level navigations
    Lax,
    /// None - cookie sent for all requests (requires Secure)
    None,
}

/// Attributes forwarded as-is to the session cookie
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CookieOptions {
    /// Cookie domain (default: None - current domain only)
    pub domain: Option<String>,
    /// Cookie path (default: "/")
    pub path: String,
    /// HttpOnly flag (default: true)
    pub http_only: bool,
    /// Secure flag (default: false)
    pub secure: bool,
    /// SameSite attribute (default: Lax)
    pub same_site: SameSite,
    /// Max age in seconds; None makes a browser-session cookie.
    /// Ignored when a session ttl is configured.
    pub max_age: Option<u64>,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            domain: None,
            path: "/".to_string(),
            http_only: true,
            secure: false,
            same_site: SameSite::Lax,
            max_age: None,
        }
    }
}

/// Configuration for the session middleware
#[derive(Clone)]
pub struct SessionConfig {
    /// Name of the session cookie
    pub cookie_name: String,

    /// Attributes of the issued cookie
    pub cookie_options: CookieOptions,

    /// Session lifetime in seconds (default: None = never expires)
    pub ttl: Option<u64>,

    /// Default shape merged under every created or restored session's data
    pub initial_session: SessionData,

    /// Secrets for signing cookies. Empty means cookies are issued unsigned
    /// and accepted without verification. The first secret signs; all secrets
    /// are tried when verifying.
    pub secrets: Vec<String>,

    id_generator: IdGenerator,
    clock: Clock,
}

impl SessionConfig {
    /// Create a new session configuration for the given cookie name
    pub fn new<S: Into<String>>(cookie_name: S) -> Self {
        Self {
            cookie_name: cookie_name.into(),
            cookie_options: CookieOptions::default(),
            ttl: None,
            initial_session: SessionData::default(),
            secrets: Vec::new(),
            id_generator: default_id_generator(),
            clock: system_clock(),
        }
    }

    /// Replace all cookie attributes
    pub fn with_cookie_options(mut self, options: CookieOptions) -> Self {
        self.cookie_options = options;
        self
    }

    /// Set the cookie path (default: "/")
    pub fn with_cookie_path<S: Into<String>>(mut self, path: S) -> Self {
        self.cookie_options.path = path.into();
        self
    }

    /// Set the cookie domain
    pub fn with_cookie_domain<S: Into<String>>(mut self, domain: S) -> Self {
        self.cookie_options.domain = Some(domain.into());
        self
    }

    /// Set the HttpOnly flag (default: true)
    pub fn with_http_only(mut self, http_only: bool) -> Self {
        self.cookie_options.http_only = http_only;
        self
    }

    /// Set the Secure flag (default: false)
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.cookie_options.secure = secure;
        self
    }

    /// Set the SameSite attribute (default: Lax)
    pub fn with_same_site(mut self, same_site: SameSite) -> Self {
        self.cookie_options.same_site = same_site;
        self
    }

    /// Set the cookie max age in seconds, used only when no ttl is set
    pub fn with_max_age(mut self, max_age: impl Into<Option<u64>>) -> Self {
        self.cookie_options.max_age = max_age.into().map(|secs| secs.min(MAX_TTL_SECS));
        self
    }

    /// Set the session ttl in seconds, clamped to [`MAX_TTL_SECS`].
    /// Takes precedence over the cookie max age.
    pub fn with_ttl(mut self, ttl: impl Into<Option<u64>>) -> Self {
        self.ttl = ttl.into().map(|secs| secs.min(MAX_TTL_SECS));
        self
    }

    /// Set the session ttl from a Duration
    pub fn with_ttl_duration(mut self, ttl: impl Into<Option<Duration>>) -> Self {
        self.ttl = ttl.into().map(|d| d.as_secs().min(MAX_TTL_SECS));
        self
    }

    /// Set the default session data shape
    pub fn with_initial_session(mut self, initial: impl Into<SessionData>) -> Self {
        self.initial_session = initial.into();
        self
    }

    /// Sign issued cookies and verify incoming ones with this secret
    pub fn with_secret<S: Into<String>>(mut self, secret: S) -> Self {
        self.secrets = vec![secret.into()];
        self
    }

    /// Use multiple secrets for rotation; the first one signs
    pub fn with_secrets<I, S>(mut self, secrets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.secrets = secrets.into_iter().map(|s| s.into()).collect();
        self
    }

    /// Override the session id generator.
    ///
    /// Generated ids must not contain `.` or be a sentinel value such as
    /// `null`; sessions under such ids are never stored or sent to the client.
    pub fn with_id_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.id_generator = Arc::new(generator);
        self
    }

    /// Override the time source
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    /// The configured id generator
    pub fn id_generator(&self) -> IdGenerator {
        Arc::clone(&self.id_generator)
    }

    /// Produce a fresh session id
    pub fn generate_id(&self) -> String {
        (self.id_generator)()
    }

    /// Current time according to the configured clock
    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Whether issued cookies are signed
    pub fn is_signed(&self) -> bool {
        !self.secrets.is_empty()
    }

    /// Expiry for a session created at `now`
    ///
    /// An instant past what chrono can represent means the session never expires.
    pub fn expiry_from(&self, now: DateTime<Utc>) -> Expiry {
        let Some(ttl) = self.ttl else {
            return Expiry::Never;
        };
        i64::try_from(ttl.min(MAX_TTL_SECS))
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .and_then(|ttl| now.checked_add_signed(ttl))
            .map_or(Expiry::Never, Expiry::At)
    }

    /// Max age in seconds for the issued cookie.
    ///
    /// With a ttl the cookie expires a margin before the session does; a ttl
    /// shorter than the margin is used as-is.
    pub fn cookie_max_age(&self) -> Option<u64> {
        let max_age = match self.ttl {
            Some(ttl) if ttl > COOKIE_TTL_MARGIN_SECS => Some(ttl - COOKIE_TTL_MARGIN_SECS),
            Some(ttl) => Some(ttl),
            None => self.cookie_options.max_age,
        };
        max_age.map(|secs| secs.min(MAX_TTL_SECS))
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("cookie_name", &self.cookie_name)
            .field("cookie_options", &self.cookie_options)
            .field("ttl", &self.ttl)
            .field("initial_session", &self.initial_session)
            .field("signed", &self.is_signed())
            .finish()
    }
}
