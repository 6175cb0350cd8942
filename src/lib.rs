//! # salvo-custom-session
//!
//! Store-agnostic session middleware for the Salvo web framework.
//!
//! Sessions are identified by a cookie carrying their id (optionally signed as
//! `id.signature`), loaded through a pluggable [`SessionStore`], handed to the
//! request as a [`Session`], and written back after the handler only when
//! their data actually changed.
//!
//! ## Features
//!
//! - **Pluggable stores**: in-memory, Redis (`redis-store`), PostgreSQL (`postgres-store`), or your own
//! - **Write avoidance**: read-only requests never write to the store
//! - **Lazy expiry**: expired sessions are deleted when a request reads them
//! - **Schema evolution**: missing keys are backfilled from the initial session shape
//! - **Safe destroy**: either the session is gone and the cookie cleared, or nothing changed
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use salvo::prelude::*;
//! use salvo_custom_session::{MemoryStore, SessionConfig, SessionDepotExt, SessionHandler};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = SessionConfig::new("my_app_sid")
//!         .with_secret("your-secret-key")
//!         .with_ttl(86400);
//!
//!     let router = Router::new()
//!         .hoop(SessionHandler::new(MemoryStore::new(), config))
//!         .get(index);
//!
//!     let acceptor = TcpListener::new("127.0.0.1:5800").bind().await;
//!     Server::new(acceptor).serve(router).await;
//! }
//!
//! #[handler]
//! async fn index(depot: &mut Depot) -> &'static str {
//!     let session = depot.session_mut().unwrap();
//!     let views: i32 = session.get("views").unwrap_or(0);
//!     session.set("views", views + 1);
//!     "Hello, World!"
//! }
//! ```

pub mod config;
pub mod cookie_signature;
pub mod error;
pub mod handler;
pub mod manager;
pub mod record;
pub mod regenerate;
pub mod session;
pub mod store;
pub mod token;

pub use config::{CookieOptions, SameSite, SessionConfig};
pub use error::{SessionError, SessionResult};
pub use handler::SessionHandler;
pub use manager::{PersistOutcome, SessionManager};
pub use record::{Expiry, SessionData, SessionMetadata, SessionRecord};
pub use regenerate::CookieAction;
pub use session::Session;
pub use store::{IdGenerator, MemoryStore, SessionStore};
pub use token::IncomingCookie;

#[cfg(feature = "redis-store")]
pub use store::RedisStore;

#[cfg(feature = "postgres-store")]
pub use store::PostgresStore;

/// Extension trait for Depot to easily access session
pub mod depot_ext;
pub use depot_ext::SessionDepotExt;
