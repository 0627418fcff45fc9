//! Identity, session lifecycle and storage failure handling.

mod common;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, StatusCode};
use common::{get, request, write, Harness, NOW};
use servo_gateway::{Hs256Tokens, ServoConfig, TokenAuthority};
use servo_storage::{
    InMemoryStore, Operation, QueryResult, Session, StorageError, Store, StoreConnection,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn root_renders_stats() {
    let h = Harness::new();

    let reply = h.send(get("/", "c1", None)).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(
        reply.json(),
        serde_json::json!({
            "client": "c1",
            "ttl": 300,
            "expire_on": "Tue 2023-11-14 22:18:20 UTC"
        })
    );
    assert_eq!(h.store.session("c1"), Some(Session::new("c1", NOW + 300)));
}

#[tokio::test]
async fn live_session_keeps_its_expiry() {
    let h = Harness::new();
    h.store.insert_session(Session::new("c1", NOW + 42));

    h.send(get("/", "c1", None)).await;
    assert_eq!(h.store.session("c1").unwrap().expire_on, NOW + 42);
}

#[tokio::test]
async fn expired_session_is_renewed_for_same_client() {
    let h = Harness::new();
    let first = h.send(get("/", "c1", None)).await;
    assert_eq!(first.status, StatusCode::OK);

    h.clock.advance(301);
    let reply = h.send(get("/", "c1", None)).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.client(), "c1");

    let session = h.store.session("c1").unwrap();
    assert_eq!(session.expire_on, NOW + 301 + 300);
    assert_eq!(h.store.session_count(), 1);
}

#[tokio::test]
async fn session_expiring_exactly_now_is_expired() {
    let h = Harness::new();
    h.store.insert_session(Session::new("c1", NOW));

    h.send(get("/", "c1", None)).await;
    assert_eq!(h.store.session("c1").unwrap().expire_on, NOW + 300);
}

#[tokio::test]
async fn anonymous_request_gets_identity_and_session() {
    let h = Harness::new();

    let reply = h
        .send(request(Method::GET, "/", None).body(Body::empty()).unwrap())
        .await;
    assert_eq!(reply.status, StatusCode::OK);

    let client = reply.client();
    assert_eq!(client.len(), 36);
    assert_eq!(reply.json()["client"], client.as_str());
    assert!(h.store.session(&client).is_some());
    assert!(reply.header(header::AUTHORIZATION).is_none());
}

#[tokio::test]
async fn non_get_root_is_forbidden() {
    let h = Harness::new();

    let reply = h
        .send(write(Method::POST, "/", "c1", "text/plain", "x"))
        .await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    assert_eq!(reply.client(), "c1");
}

#[tokio::test]
async fn public_mode_serves_console() {
    let mut config = ServoConfig::default();
    config.session.public_mode = true;
    let h = Harness::with_config(config);

    let reply = h.send(get("/", "c1", Some("text/html,*/*"))).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply
        .header(header::CONTENT_TYPE)
        .unwrap()
        .starts_with("text/html"));
    assert!(reply.text().contains("/console.js"));

    let reply = h.send(get("/", "c1", Some("application/json"))).await;
    assert_eq!(reply.json()["client"], "c1");
}

#[tokio::test]
async fn console_script_is_static() {
    let h = Harness::new();

    let reply = h
        .send(request(Method::GET, "/console.js", None).body(Body::empty()).unwrap())
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(
        reply.header(header::CONTENT_TYPE),
        Some("application/javascript")
    );
    assert!(reply.headers.get("x-servo-client").is_none());
    assert_eq!(h.store.session_count(), 0);
}

#[tokio::test]
async fn head_is_answered_without_storage() {
    let h = Harness::new();

    let reply = h
        .send(request(Method::HEAD, "/k", Some("c1")).body(Body::empty()).unwrap())
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body.is_empty());
    assert_eq!(h.store.session_count(), 0);
}

#[tokio::test]
async fn identity_headers_on_error_responses() {
    let h = Harness::new();

    let reply = h.send(get("/missing", "c1", None)).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.client(), "c1");
    assert!(reply.header(header::SET_COOKIE).is_some());
}

#[tokio::test]
async fn overlong_client_id_is_rejected() {
    let h = Harness::new();
    let id = "x".repeat(256);

    let reply = h.send(get("/k", &id, None)).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(h.store.session_count(), 0);
}

#[tokio::test]
async fn header_identity_beats_cookie() {
    let h = Harness::new();

    let reply = h
        .send(
            request(Method::GET, "/", Some("from-header"))
                .header(header::COOKIE, "Servo-Client=from-cookie")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(reply.client(), "from-header");
}

fn auth_config() -> ServoConfig {
    let mut config = ServoConfig::default();
    config.auth.enabled = true;
    config.auth.secret = Some("test-secret".into());
    config
}

#[tokio::test]
async fn token_identity_round_trip() {
    let h = Harness::with_config(auth_config());

    let reply = h
        .send(write(Method::PUT, "/k", "c1", "text/plain", "v"))
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    let authorization = reply.header(header::AUTHORIZATION).unwrap().to_string();
    assert!(authorization.starts_with("Bearer "));

    let reply = h
        .send(
            request(Method::GET, "/k", None)
                .header(header::AUTHORIZATION, authorization)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.text(), "v");
    assert_eq!(reply.client(), "c1");
}

#[tokio::test]
async fn forged_token_is_ignored() {
    let h = Harness::with_config(auth_config());
    let forged = Hs256Tokens::new("other-secret").issue("victim").unwrap();

    let reply = h
        .send(
            request(Method::GET, "/", Some("me"))
                .header(header::AUTHORIZATION, format!("Bearer {}", forged))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.client(), "me");
}

/// Connection whose session lookups never see the existing row, as when a
/// concurrent request inserts it between our query and our insert.
struct RacingStore {
    inner: InMemoryStore,
}

struct RacingConnection {
    inner: Box<dyn StoreConnection>,
}

#[async_trait]
impl Store for RacingStore {
    async fn connect(&self) -> Result<Box<dyn StoreConnection>, StorageError> {
        Ok(Box::new(RacingConnection {
            inner: self.inner.connect().await?,
        }))
    }
}

#[async_trait]
impl StoreConnection for RacingConnection {
    async fn execute(&mut self, op: Operation) -> Result<QueryResult, StorageError> {
        match op {
            Operation::QuerySession { .. } => Ok(QueryResult::Rows(vec![])),
            other => self.inner.execute(other).await,
        }
    }
}

#[tokio::test]
async fn losing_session_race_is_conflict() {
    let memory = InMemoryStore::new();
    memory.insert_session(Session::new("c1", NOW + 100));
    let store = Arc::new(RacingStore {
        inner: memory.clone(),
    });
    let h = Harness::with_store(ServoConfig::default(), memory, store);

    let reply = h.send(get("/k", "c1", None)).await;
    assert_eq!(reply.status, StatusCode::CONFLICT);
    assert_eq!(
        reply.json(),
        serde_json::json!({"code": 409, "message": "Conflict"})
    );
    assert_eq!(h.store.session_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn store_not_ready_is_retried() {
    let h = Harness::new();
    h.store.fail_next_connects(3);

    let reply = h.send(get("/", "c1", None)).await;
    assert_eq!(reply.status, StatusCode::OK);
}

#[tokio::test(start_paused = true)]
async fn store_never_ready_is_500() {
    let mut config = ServoConfig::default();
    config.timeouts.connect = Duration::from_millis(500);
    let h = Harness::with_config(config);
    h.store.fail_next_connects(1_000);

    let reply = h.send(get("/", "c1", None)).await;
    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn query_failure_hides_driver_text() {
    let h = Harness::new();
    h.store.fail_next_queries(1);

    let reply = h.send(get("/", "c1", None)).await;
    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        reply.json(),
        serde_json::json!({"code": 500, "message": "Internal Server Error"})
    );
    assert!(!reply.text().contains("injected"));
}

#[tokio::test]
async fn anonymous_session_failure_is_500() {
    let h = Harness::new();
    h.store.fail_next_queries(1);

    let reply = h
        .send(request(Method::GET, "/", None).body(Body::empty()).unwrap())
        .await;
    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(reply.headers.get("x-servo-client").is_none());
    assert_eq!(h.store.session_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn slow_storage_is_504() {
    let h = Harness::new();
    h.store.set_query_delay(Some(Duration::from_secs(60)));

    let reply = h.send(get("/", "c1", None)).await;
    assert_eq!(reply.status, StatusCode::GATEWAY_TIMEOUT);
}

#[tokio::test(start_paused = true)]
async fn whole_request_timeout_is_504() {
    let mut config = ServoConfig::default();
    config.timeouts.request = Duration::from_secs(1);
    let h = Harness::with_config(config);
    h.store.set_query_delay(Some(Duration::from_secs(60)));

    let reply = h.send(get("/", "c1", None)).await;
    assert_eq!(reply.status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(reply.json()["message"], "Request exceeded 1000ms timeout");
}
