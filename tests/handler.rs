use chrono::Utc;
use salvo::http::header::SET_COOKIE;
use salvo::prelude::*;
use salvo::test::{ResponseExt, TestClient};
use serde_json::json;

use salvo_custom_session::cookie_signature::sign;
use salvo_custom_session::{
    Expiry, MemoryStore, SessionConfig, SessionData, SessionDepotExt, SessionHandler,
    SessionMetadata, SessionRecord, SessionStore,
};

const SECRET: &str = "keyboard cat";

#[handler]
async fn set_session(depot: &mut Depot) -> String {
    let session = depot.session_mut().expect("session is bound");
    session.set("whateverYouWant", "test it works!");
    session.id()
}

#[handler]
async fn peek(depot: &mut Depot) -> String {
    depot.session().map(|session| session.id()).unwrap_or_default()
}

#[handler]
async fn destroy(depot: &mut Depot) -> String {
    let session = depot.session_mut().expect("session is bound");
    session.destroy().await.to_string()
}

fn service(store: MemoryStore) -> Service {
    let config = SessionConfig::new("my_app_sid")
        .with_secret(SECRET)
        .with_ttl(3600)
        .with_initial_session(SessionData::from_value(json!({"whateverYouWant": "<unset>"})).unwrap())
        .with_id_generator(|| "test_session_id".to_string());

    let router = Router::new()
        .hoop(SessionHandler::new(store, config))
        .push(Router::with_path("set-session").get(set_session))
        .push(Router::with_path("peek").get(peek))
        .push(Router::with_path("destroy").get(destroy));
    Service::new(router)
}

fn set_cookies(res: &Response) -> Vec<String> {
    res.headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .map(str::to_string)
        .collect()
}

async fn seeded(store: &MemoryStore, id: &str) {
    let record = SessionRecord::new(
        id.to_string(),
        SessionData::from_value(json!({"whateverYouWant": "seeded"})).unwrap(),
        Expiry::Never,
        SessionMetadata::default(),
        Utc::now(),
    );
    assert!(store.update(id, &record).await);
}

#[tokio::test]
async fn test_first_request_creates_and_persists_session() {
    let store = MemoryStore::new();
    let service = service(store.clone());

    let body = TestClient::get("http://127.0.0.1:5800/set-session")
        .send(&service)
        .await
        .take_string()
        .await
        .unwrap();
    assert_eq!(body, "test_session_id");

    let stored = store.read("test_session_id").await.unwrap().unwrap();
    assert_eq!(
        stored.data.get::<String>("whateverYouWant").as_deref(),
        Some("test it works!")
    );
}

#[tokio::test]
async fn test_signed_cookie_restores_existing_session() {
    let store = MemoryStore::new();
    seeded(&store, "existing-id").await;
    let service = service(store.clone());

    let body = TestClient::get("http://127.0.0.1:5800/peek")
        .add_header("cookie", format!("my_app_sid={}", sign("existing-id", SECRET)), true)
        .send(&service)
        .await
        .take_string()
        .await
        .unwrap();
    assert_eq!(body, "existing-id");
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_tampered_cookie_is_not_trusted() {
    let store = MemoryStore::new();
    seeded(&store, "existing-id").await;
    let service = service(store.clone());

    let body = TestClient::get("http://127.0.0.1:5800/set-session")
        .add_header("cookie", "my_app_sid=existing-id.bm90LWEtc2lnbmF0dXJl", true)
        .send(&service)
        .await
        .take_string()
        .await
        .unwrap();
    assert_eq!(body, "test_session_id");

    let untouched = store.read("existing-id").await.unwrap().unwrap();
    assert_eq!(
        untouched.data.get::<String>("whateverYouWant").as_deref(),
        Some("seeded")
    );
}

#[tokio::test]
async fn test_destroy_removes_session_from_store() {
    let store = MemoryStore::new();
    seeded(&store, "existing-id").await;
    let service = service(store.clone());

    let body = TestClient::get("http://127.0.0.1:5800/destroy")
        .add_header("cookie", format!("my_app_sid={}", sign("existing-id", SECRET)), true)
        .send(&service)
        .await
        .take_string()
        .await
        .unwrap();
    assert_eq!(body, "true");
    assert!(store.read("existing-id").await.unwrap().is_none());
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_issued_cookie_is_signed_and_expires_before_session() {
    let service = service(MemoryStore::new());

    let res = TestClient::get("http://127.0.0.1:5800/set-session")
        .send(&service)
        .await;
    let cookies = set_cookies(&res);
    assert_eq!(cookies.len(), 1, "{cookies:?}");

    let cookie = &cookies[0];
    assert!(cookie.starts_with("my_app_sid=test_session_id."), "{cookie}");
    assert!(cookie.contains("Max-Age=3540"), "{cookie}");
    assert!(cookie.contains("HttpOnly"), "{cookie}");
    assert!(cookie.contains("Path=/"), "{cookie}");
}

#[tokio::test]
async fn test_restored_session_sends_no_cookie() {
    let store = MemoryStore::new();
    seeded(&store, "existing-id").await;
    let service = service(store);

    let res = TestClient::get("http://127.0.0.1:5800/peek")
        .add_header("cookie", format!("my_app_sid={}", sign("existing-id", SECRET)), true)
        .send(&service)
        .await;
    assert!(set_cookies(&res).is_empty());
}

#[tokio::test]
async fn test_destroy_clears_cookie() {
    let store = MemoryStore::new();
    seeded(&store, "existing-id").await;
    let service = service(store);

    let res = TestClient::get("http://127.0.0.1:5800/destroy")
        .add_header("cookie", format!("my_app_sid={}", sign("existing-id", SECRET)), true)
        .send(&service)
        .await;
    let cookies = set_cookies(&res);
    assert_eq!(cookies.len(), 1, "{cookies:?}");

    let cookie = &cookies[0];
    assert!(cookie.starts_with("my_app_sid=;"), "{cookie}");
    assert!(cookie.contains("Max-Age=0"), "{cookie}");
    assert!(cookie.contains("1970"), "{cookie}");
}

#[tokio::test]
async fn test_destroy_of_unknown_session_clears_cookie_without_storing() {
    let store = MemoryStore::new();
    let service = service(store.clone());

    let mut res = TestClient::get("http://127.0.0.1:5800/destroy")
        .add_header("cookie", format!("my_app_sid={}", sign("gone-id", SECRET)), true)
        .send(&service)
        .await;
    assert_eq!(res.take_string().await.unwrap(), "true");

    let cookies = set_cookies(&res);
    assert_eq!(cookies.len(), 1, "{cookies:?}");
    assert!(cookies[0].starts_with("my_app_sid=;"), "{}", cookies[0]);
    assert!(store.is_empty());
}
