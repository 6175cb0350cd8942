//! Basic example using the in-memory session store

use salvo::prelude::*;
use salvo_custom_session::{MemoryStore, SessionConfig, SessionData, SessionDepotExt, SessionHandler};
use serde_json::json;

#[handler]
async fn index(depot: &mut Depot) -> String {
    let session = depot.session_mut().expect("Session not found");

    let views: i32 = session.get("views").unwrap_or(0);
    session.set("views", views + 1);

    format!(
        "Hello! You have viewed this page {} time(s).\nSession ID: {}",
        views + 1,
        session.id()
    )
}

#[handler]
async fn get_user(depot: &mut Depot) -> String {
    let session = depot.session_mut().expect("Session not found");

    match session.get::<String>("user") {
        Some(user) => format!("Logged in as: {}", user),
        None => "Not logged in".to_string(),
    }
}

#[handler]
async fn set_user(req: &mut Request, depot: &mut Depot) -> String {
    let session = depot.session_mut().expect("Session not found");
    let username = req.query::<String>("name").unwrap_or_else(|| "anonymous".to_string());

    session.set("user", &username);

    format!("User set to: {}", username)
}

#[handler]
async fn logout(depot: &mut Depot) -> &'static str {
    let session = depot.session_mut().expect("Session not found");
    session.set("user", serde_json::Value::Null);
    "Logged out successfully"
}

#[handler]
async fn destroy_session(depot: &mut Depot) -> &'static str {
    let session = depot.session_mut().expect("Session not found");

    if session.destroy().await {
        "Session destroyed"
    } else {
        "Session could not be destroyed, try again"
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let initial = SessionData::from_value(json!({"views": 0, "user": null}))
        .expect("initial session is an object");

    let config = SessionConfig::new("my_app_sid")
        .with_secret("your-super-secret-key-change-in-production")
        .with_ttl(3600)
        .with_initial_session(initial);

    let router = Router::new()
        .hoop(SessionHandler::new(MemoryStore::new(), config))
        .get(index)
        .push(Router::with_path("user").get(get_user))
        .push(Router::with_path("login").get(set_user))
        .push(Router::with_path("logout").get(logout))
        .push(Router::with_path("destroy").get(destroy_session));

    let acceptor = TcpListener::new("127.0.0.1:5800").bind().await;
    println!("Server running at http://127.0.0.1:5800");
    println!("Try these endpoints:");
    println!("  GET /           - View counter");
    println!("  GET /user       - Get current user");
    println!("  GET /login?name=alice - Set user");
    println!("  GET /logout     - Forget the user");
    println!("  GET /destroy    - Destroy session");

    Server::new(acceptor).serve(router).await;
}
