//! Session middleware handler for Salvo

use salvo_core::http::cookie::time::{Duration, OffsetDateTime};
use salvo_core::http::cookie::{self, Cookie};
use salvo_core::http::header::USER_AGENT;
use salvo_core::prelude::*;
use std::net::IpAddr;

use crate::config::{SameSite, SessionConfig};
use crate::cookie_signature::{sign, unsign_with_secrets};
use crate::manager::SessionManager;
use crate::record::SessionMetadata;
use crate::regenerate::CookieAction;
use crate::store::SessionStore;
use crate::token::IncomingCookie;

/// Depot key the bound [`Session`](crate::Session) is stored under
pub const SESSION_KEY: &str = "salvo.custom.session";

/// Session middleware for Salvo
///
/// Resolves the session before the rest of the chain runs, stores it in the
/// depot, then persists it and writes the session cookie once the chain
/// returns.
#[derive(Clone)]
pub struct SessionHandler {
    manager: SessionManager,
}

impl SessionHandler {
    /// Create a new session handler
    pub fn new<S: SessionStore>(store: S, config: SessionConfig) -> Self {
        Self {
            manager: SessionManager::new(store, config),
        }
    }

    /// The lifecycle manager behind this handler
    pub fn manager(&self) -> &SessionManager {
        &self.manager
    }

    /// Read the session cookie, verifying its signature when secrets are set
    fn incoming_cookie(&self, req: &Request) -> IncomingCookie {
        let config = self.manager.config();
        let incoming = IncomingCookie::from_raw(req.cookie(&config.cookie_name).map(|c| c.value()));

        if !config.is_signed() {
            return incoming;
        }
        match incoming {
            IncomingCookie::Value(value) => match unsign_with_secrets(&value, &config.secrets) {
                Some(_) => IncomingCookie::Value(value),
                None => {
                    tracing::debug!("session cookie signature rejected");
                    IncomingCookie::Rejected
                }
            },
            other => other,
        }
    }

    /// Set session cookie on response
    fn set_session_cookie(&self, res: &mut Response, session_id: &str) {
        let config = self.manager.config();
        let options = &config.cookie_options;
        let value = match config.secrets.first() {
            Some(secret) => sign(session_id, secret),
            None => session_id.to_string(),
        };

        let mut cookie_builder = Cookie::build((config.cookie_name.clone(), value))
            .path(options.path.clone())
            .http_only(options.http_only)
            .secure(options.secure)
            .same_site(same_site(&options.same_site));

        if let Some(domain) = options.domain.clone() {
            cookie_builder = cookie_builder.domain(domain);
        }

        if let Some(max_age) = config.cookie_max_age() {
            let max_age = i64::try_from(max_age).unwrap_or(i64::MAX);
            cookie_builder = cookie_builder.max_age(Duration::seconds(max_age));
        }

        res.add_cookie(cookie_builder.build());
    }

    /// Remove session cookie
    fn remove_session_cookie(&self, res: &mut Response) {
        let config = self.manager.config();
        let options = &config.cookie_options;

        let mut cookie_builder = Cookie::build((config.cookie_name.clone(), ""))
            .path(options.path.clone())
            .http_only(options.http_only)
            .secure(options.secure)
            .same_site(same_site(&options.same_site))
            .max_age(Duration::ZERO)
            .expires(OffsetDateTime::UNIX_EPOCH);

        if let Some(domain) = options.domain.clone() {
            cookie_builder = cookie_builder.domain(domain);
        }

        res.add_cookie(cookie_builder.build());
    }
}

fn same_site(same_site: &SameSite) -> cookie::SameSite {
    match same_site {
        SameSite::Strict => cookie::SameSite::Strict,
        SameSite::Lax => cookie::SameSite::Lax,
        SameSite::None => cookie::SameSite::None,
    }
}

/// Client address and user agent of the request
fn request_metadata(req: &Request) -> SessionMetadata {
    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
    };

    let remote = req.remote_addr();
    let peer = remote
        .as_ipv4()
        .map(|addr| IpAddr::V4(*addr.ip()))
        .or_else(|| remote.as_ipv6().map(|addr| IpAddr::V6(*addr.ip())));

    SessionMetadata::detect(header("x-forwarded-for"), peer, header(USER_AGENT.as_str()))
}

#[async_trait]
impl Handler for SessionHandler {
    async fn handle(&self, req: &mut Request, depot: &mut Depot, res: &mut Response, ctrl: &mut FlowCtrl) {
        let incoming = self.incoming_cookie(req);
        let metadata = request_metadata(req);
        let session = self.manager.resolve(incoming, metadata).await;

        depot.insert(SESSION_KEY, session.clone());

        ctrl.call_next(req, depot, res).await;

        let outcome = self.manager.persist(&session).await;
        tracing::debug!(session_id = %session.id(), ?outcome, "session persisted");

        match session.cookie_action() {
            CookieAction::Keep => {}
            CookieAction::Issue(id) => self.set_session_cookie(res, &id),
            CookieAction::Clear => self.remove_session_cookie(res),
        }
    }
}
