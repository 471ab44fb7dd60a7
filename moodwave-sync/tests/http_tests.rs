use moodwave_model::{
    DailyWindow, EntityType, GeneratedMusic, MoodEntry, SyncAction, SyncPayload, UserPreferences,
};
use moodwave_storage::SecureKeyValueStore;
use moodwave_sync::{
    route, AuthConfig, AuthTokenProvider, HttpSyncEndpoint, HttpTokenProvider, Method,
    RemoteError, RemoteSyncEndpoint, SyncConfig, SyncEngine, SyncError, SyncQueue, SyncQueueItem,
};
use moodwave_types::{Clock, SystemClock};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn queue() -> Arc<SyncQueue> {
    let store = Arc::new(SecureKeyValueStore::open_in_memory());
    store.initialize();
    Arc::new(SyncQueue::load(store, Arc::new(SystemClock)))
}

fn item(payload: SyncPayload, action: SyncAction) -> SyncQueueItem {
    let queue = queue();
    let id = queue.enqueue(payload, action);
    queue.get(&id).unwrap()
}

fn endpoint(server: &MockServer) -> HttpSyncEndpoint {
    HttpSyncEndpoint::new(&SyncConfig {
        base_url: server.uri(),
        ..Default::default()
    })
    .unwrap()
}

fn window() -> DailyWindow {
    DailyWindow {
        user_id: "u1".into(),
        start_minute: 8 * 60,
        end_minute: 10 * 60,
        timezone: "Europe/Berlin".into(),
    }
}

// ── Route table ─────────────────────────────────────────────────

#[test]
fn every_entity_and_action_has_a_route() {
    let payloads = [
        SyncPayload::MoodEntry(MoodEntry::new("u1", 5)),
        SyncPayload::DailyWindow(window()),
        SyncPayload::GeneratedMusic(GeneratedMusic::new("u1", "Calm", 5, 120)),
        SyncPayload::UserPreferences(UserPreferences::new("u1")),
    ];

    for payload in &payloads {
        let path = match payload.entity_type() {
            EntityType::MoodEntry => "/mood-entries",
            EntityType::DailyWindow => "/daily-windows",
            EntityType::GeneratedMusic => "/generated-music",
            EntityType::UserPreferences => "/user-preferences",
        };
        for action in [SyncAction::Create, SyncAction::Update, SyncAction::Delete] {
            assert_eq!(route(payload, action).path, path);
        }
        assert_eq!(route(payload, SyncAction::Delete).method, Method::Delete);
        assert_eq!(route(payload, SyncAction::Update).method, Method::Put);
    }
}

#[test]
fn collections_create_with_post_and_singletons_upsert() {
    let mood = SyncPayload::MoodEntry(MoodEntry::new("u1", 5));
    let music = SyncPayload::GeneratedMusic(GeneratedMusic::new("u1", "Calm", 5, 120));
    let window = SyncPayload::DailyWindow(window());
    let prefs = SyncPayload::UserPreferences(UserPreferences::new("u1"));

    assert_eq!(route(&mood, SyncAction::Create).method, Method::Post);
    assert_eq!(route(&music, SyncAction::Create).method, Method::Post);
    assert_eq!(route(&window, SyncAction::Create).method, Method::Put);
    assert_eq!(route(&prefs, SyncAction::Create).method, Method::Put);
}

// ── Requests ────────────────────────────────────────────────────

#[tokio::test]
async fn create_posts_wire_body_with_bearer() {
    let server = MockServer::start().await;
    let entry = MoodEntry::new("u1", 7);
    let item = item(SyncPayload::MoodEntry(entry.clone()), SyncAction::Create);

    Mock::given(method("POST"))
        .and(path("/mood-entries"))
        .and(header("authorization", "Bearer token-1"))
        .and(body_partial_json(json!({
            "entityType": "mood-entry",
            "action": "create",
            "payload": {"mood": 7, "userId": "u1"},
        })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    endpoint(&server).apply(&item, "token-1").await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["id"], json!(item.id.as_str()));
    assert_eq!(body["enqueuedAt"], json!(item.enqueued_at));
    assert_eq!(body["payload"]["id"], json!(entry.id.to_string()));
    assert!(body.get("retryCount").is_none());
}

#[tokio::test]
async fn update_uses_put() {
    let server = MockServer::start().await;
    let item = item(
        SyncPayload::GeneratedMusic(GeneratedMusic::new("u1", "Calm", 5, 120)),
        SyncAction::Update,
    );

    Mock::given(method("PUT"))
        .and(path("/generated-music"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    endpoint(&server).apply(&item, "t").await.unwrap();
}

#[tokio::test]
async fn delete_sends_id_query_and_no_body() {
    let server = MockServer::start().await;
    let entry = MoodEntry::new("u1", 3);
    let item = item(SyncPayload::MoodEntry(entry.clone()), SyncAction::Delete);

    Mock::given(method("DELETE"))
        .and(path("/mood-entries"))
        .and(query_param("id", entry.id.to_string()))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    endpoint(&server).apply(&item, "t").await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].body.is_empty());
}

#[tokio::test]
async fn singleton_delete_uses_user_id() {
    let server = MockServer::start().await;
    let item = item(SyncPayload::DailyWindow(window()), SyncAction::Delete);

    Mock::given(method("DELETE"))
        .and(path("/daily-windows"))
        .and(query_param("id", "u1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    endpoint(&server).apply(&item, "t").await.unwrap();
}

#[tokio::test]
async fn trailing_slash_in_base_url_is_ignored() {
    let server = MockServer::start().await;
    let item = item(SyncPayload::DailyWindow(window()), SyncAction::Update);

    Mock::given(method("PUT"))
        .and(path("/daily-windows"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let endpoint = HttpSyncEndpoint::new(&SyncConfig {
        base_url: format!("{}/", server.uri()),
        ..Default::default()
    })
    .unwrap();
    assert_eq!(endpoint.base_url(), server.uri());
    endpoint.apply(&item, "t").await.unwrap();
}

// ── Status classification ───────────────────────────────────────

async fn status_error(status: u16) -> RemoteError {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
        .mount(&server)
        .await;

    let item = item(SyncPayload::MoodEntry(MoodEntry::new("u1", 5)), SyncAction::Create);
    endpoint(&server).apply(&item, "t").await.unwrap_err()
}

#[tokio::test]
async fn unauthorized_status() {
    assert_eq!(status_error(401).await, RemoteError::Unauthorized);
}

#[tokio::test]
async fn server_errors_are_transient() {
    for status in [500, 502, 503, 408, 429] {
        assert!(
            matches!(status_error(status).await, RemoteError::Transient(_)),
            "status {status}"
        );
    }
}

#[tokio::test]
async fn client_errors_are_rejected() {
    assert_eq!(
        status_error(400).await,
        RemoteError::Rejected {
            status: 400,
            message: "nope".to_string(),
        }
    );
    assert!(matches!(
        status_error(403).await,
        RemoteError::Rejected { status: 403, .. }
    ));
}

#[tokio::test]
async fn connection_failure_is_transient() {
    let endpoint = HttpSyncEndpoint::new(&SyncConfig {
        base_url: "http://127.0.0.1:1".to_string(),
        ..Default::default()
    })
    .unwrap();
    let item = item(SyncPayload::MoodEntry(MoodEntry::new("u1", 5)), SyncAction::Create);

    let err = endpoint.apply(&item, "t").await.unwrap_err();
    assert!(matches!(err, RemoteError::Transient(_)));
}

// ── Token refresh ───────────────────────────────────────────────

fn provider(server: &MockServer, refresh_token: Option<&str>) -> HttpTokenProvider {
    HttpTokenProvider::new(
        &AuthConfig {
            refresh_url: format!("{}/auth/refresh", server.uri()),
            access_token: Some("stale".to_string()),
            refresh_token: refresh_token.map(str::to_string),
        },
        &SyncConfig::default(),
    )
    .unwrap()
}

#[tokio::test]
async fn refresh_adopts_new_tokens() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .and(body_partial_json(json!({"refreshToken": "r1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": "fresh",
            "refreshToken": "r2",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let auth = provider(&server, Some("r1"));
    assert_eq!(auth.get_token().await.as_deref(), Some("stale"));

    auth.refresh_token().await.unwrap();
    assert_eq!(auth.get_token().await.as_deref(), Some("fresh"));
    assert_eq!(auth.current_refresh_token().await.as_deref(), Some("r2"));
}

#[tokio::test]
async fn refresh_keeps_refresh_token_when_not_rotated() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"accessToken": "fresh"})))
        .mount(&server)
        .await;

    let auth = provider(&server, Some("r1"));
    auth.refresh_token().await.unwrap();
    assert_eq!(auth.current_refresh_token().await.as_deref(), Some("r1"));
}

#[tokio::test]
async fn rejected_refresh_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let auth = provider(&server, Some("r1"));
    let err = auth.refresh_token().await.unwrap_err();
    assert!(matches!(err, SyncError::Auth(_)));
    assert_eq!(auth.get_token().await.as_deref(), Some("stale"));
}

#[tokio::test]
async fn refresh_without_refresh_token_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let auth = provider(&server, None);
    assert!(matches!(auth.refresh_token().await, Err(SyncError::Auth(_))));
}

#[tokio::test]
async fn signed_out_provider_has_no_token() {
    let server = MockServer::start().await;
    let auth = provider(&server, Some("r1"));
    auth.clear().await;
    assert_eq!(auth.get_token().await, None);

    auth.set_tokens("a".to_string(), None).await;
    assert_eq!(auth.get_token().await.as_deref(), Some("a"));
}

// ── End to end ──────────────────────────────────────────────────

#[tokio::test]
async fn engine_refreshes_expired_token_over_http() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/mood-entries"))
        .and(header("authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/mood-entries"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(201))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"accessToken": "fresh"})))
        .expect(1)
        .mount(&server)
        .await;

    let config = SyncConfig {
        base_url: server.uri(),
        ..Default::default()
    };
    let queue = queue();
    queue.enqueue(SyncPayload::MoodEntry(MoodEntry::new("u1", 2)), SyncAction::Create);
    queue.enqueue(SyncPayload::MoodEntry(MoodEntry::new("u1", 9)), SyncAction::Create);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let engine = SyncEngine::new(
        queue.clone(),
        Arc::new(endpoint(&server)),
        Arc::new(provider(&server, Some("r1"))),
        clock,
        &config,
    );

    let outcome = engine.force_sync_now().await;
    assert!(outcome.is_success());
    assert_eq!(outcome.report().unwrap().succeeded, 2);
    assert_eq!(queue.size(), 0);
}
