use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use capport::{
    app,
    config::Config,
    error::{AppError, Result},
    models::requirement::{Requirement, RequirementKind},
    repositories::{
        requirement::{MemoryRequirementStore, RequirementStore},
        session::{MemorySessionStore, SessionStore},
    },
    services::{traffic::TrafficEnabler, usage::UsageMeter},
    state::AppState,
};

const HOST: &str = "portal.test";

#[derive(Default)]
struct SharedUsage(AtomicU64);

#[async_trait]
impl UsageMeter for SharedUsage {
    async fn usage(&self, _identity: &str) -> Result<u64> {
        Ok(self.0.load(Ordering::SeqCst))
    }
}

#[derive(Default)]
struct RecordingTraffic(Mutex<Vec<String>>);

impl RecordingTraffic {
    fn enabled(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

#[async_trait]
impl TrafficEnabler for RecordingTraffic {
    async fn enable(&self, identity: &str) -> Result<()> {
        self.0.lock().unwrap().push(identity.to_string());
        Ok(())
    }
}

/// Accepts `view_page` but fails every other create, remembering the
/// sessions it saw.
#[derive(Default)]
struct FlakyRequirements {
    inner: MemoryRequirementStore,
    seen: Mutex<Vec<Uuid>>,
}

#[async_trait]
impl RequirementStore for FlakyRequirements {
    async fn create(&self, session_id: Uuid, kind: RequirementKind, url: String) -> Result<Requirement> {
        self.seen.lock().unwrap().push(session_id);
        if kind != RequirementKind::ViewPage {
            return Err(AppError::Store("backend went away".into()));
        }
        self.inner.create(session_id, kind, url).await
    }

    async fn load(&self, session_id: Uuid, kind: &RequirementKind) -> Result<Option<Requirement>> {
        self.inner.load(session_id, kind).await
    }

    async fn list_by_session(&self, session_id: Uuid) -> Result<Vec<Requirement>> {
        self.inner.list_by_session(session_id).await
    }

    async fn delete(&self, session_id: Uuid, kind: &RequirementKind) -> Result<()> {
        self.inner.delete(session_id, kind).await
    }

    async fn delete_all_by_session(&self, session_id: Uuid) -> Result<()> {
        self.inner.delete_all_by_session(session_id).await
    }
}

struct TestContext {
    app: Router,
    sessions: Arc<dyn SessionStore>,
    requirements: Arc<dyn RequirementStore>,
    usage: Arc<SharedUsage>,
    traffic: Arc<RecordingTraffic>,
}

impl TestContext {
    fn new() -> Self {
        Self::with_config(Config::default())
    }

    fn with_config(config: Config) -> Self {
        let (sessions, requirements) = AppState::memory_stores();
        Self::with_stores(config, sessions, requirements)
    }

    fn with_stores(
        config: Config,
        sessions: Arc<dyn SessionStore>,
        requirements: Arc<dyn RequirementStore>,
    ) -> Self {
        let usage = Arc::new(SharedUsage::default());
        let traffic = Arc::new(RecordingTraffic::default());
        let state = AppState::with_parts(
            config,
            sessions.clone(),
            requirements.clone(),
            usage.clone(),
            traffic.clone(),
        );
        Self {
            app: app::router(state),
            sessions,
            requirements,
            usage,
            traffic,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, HeaderMap, Vec<u8>) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.unwrap().to_bytes().to_vec();
        (status, headers, body)
    }

    async fn get(&self, uri: &str) -> (StatusCode, HeaderMap, Vec<u8>) {
        self.send(
            Request::get(uri)
                .header(header::HOST, HOST)
                .header(header::ACCEPT, "application/json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    async fn get_json(&self, uri: &str) -> (StatusCode, Value) {
        let (status, _, body) = self.get(uri).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    async fn create_session(&self, body: &str) -> (StatusCode, Value) {
        let (status, _, body) = self
            .send(
                Request::post("/capport/sessions")
                    .header(header::HOST, HOST)
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    async fn delete_session(&self, id: &str) -> (StatusCode, Vec<u8>) {
        let (status, _, body) = self
            .send(
                Request::delete(format!("/capport/sessions/{}", id))
                    .header(header::HOST, HOST)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        (status, body)
    }
}

fn requirement_kinds(status: &Value) -> Vec<String> {
    status["requirements"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry.as_object().unwrap().keys().next().unwrap().clone())
        .collect()
}

fn session_id(status: &Value) -> String {
    status["id"]["uuid"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn discovery_returns_links_to_json_clients() {
    let context = TestContext::new();
    let (status, body) = context.get_json("/capport").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "create_href": "http://portal.test/capport/sessions",
            "browse_href": "http://portal.test/"
        })
    );
}

#[tokio::test]
async fn discovery_redirects_browsers() {
    let mut config = Config::default();
    config.browse_url = Some("https://welcome.example/".into());
    let context = TestContext::with_config(config);

    let (status, headers, _) = context
        .send(
            Request::get("/capport")
                .header(header::HOST, HOST)
                .header(header::ACCEPT, "text/html,application/xhtml+xml,*/*;q=0.8")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(headers[header::LOCATION], "https://welcome.example/");
}

#[tokio::test]
async fn requirements_are_satisfied_one_by_one_until_permitted() {
    let context = TestContext::new();

    // Step 1: create the session
    let (status, created) = context.create_session(r#"{"identity":"alice"}"#).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["identity"], "alice");
    assert_eq!(created["state"]["permitted"], false);
    assert!(created.get("token").is_none());
    assert_eq!(requirement_kinds(&created), vec!["view_page", "provide_credentials"]);

    let id = session_id(&created);
    assert_eq!(
        created["id"]["href"],
        format!("http://portal.test/capport/sessions/{}", id)
    );
    assert_eq!(
        created["requirements"][0]["view_page"],
        format!("http://portal.test/terms?session={}", id)
    );
    assert_eq!(
        created["requirements"][1]["provide_credentials"],
        format!("http://portal.test/login?session={}", id)
    );

    // Step 2: accept the terms
    let (status, _, page) = context.get(&format!("/terms?session={}&accept=yes", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(page).unwrap().contains("Terms accepted"));

    let (_, after_terms) = context.get_json(&format!("/capport/sessions/{}", id)).await;
    assert_eq!(requirement_kinds(&after_terms), vec!["provide_credentials"]);
    assert_eq!(after_terms["state"]["permitted"], false);
    assert!(context.traffic.enabled().is_empty());

    // Step 3: log in
    let (status, _, page) = context.get(&format!("/login?session={}&password=hunter2", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(page).unwrap().contains("Welcome"));
    assert_eq!(context.traffic.enabled(), vec!["alice".to_string()]);

    let (_, permitted) = context.get_json(&format!("/capport/sessions/{}", id)).await;
    assert_eq!(permitted["state"]["permitted"], true);
    assert!(permitted["requirements"].as_array().unwrap().is_empty());
    assert!(permitted["token"].as_str().is_some_and(|t| !t.is_empty()));
    assert!(permitted["state"]["expires"]
        .as_str()
        .is_some_and(|e| e.ends_with("+00:00")));
    assert_eq!(permitted["state"]["bytes_remaining"], 10_000_000);
}

#[tokio::test]
async fn quota_is_enforced_against_metered_usage() {
    let context = TestContext::new();
    let (_, created) = context.create_session(r#"{"identity":"bob"}"#).await;
    let id = session_id(&created);

    context.get(&format!("/terms?session={}&accept", id)).await;
    context.get(&format!("/login?session={}&password=", id)).await;

    context.usage.0.store(9_999_999, Ordering::SeqCst);
    let (_, status) = context.get_json(&format!("/capport/sessions/{}", id)).await;
    assert_eq!(status["state"]["permitted"], true);
    assert_eq!(status["state"]["bytes_remaining"], 1);

    context.usage.0.store(10_000_000, Ordering::SeqCst);
    let (_, status) = context.get_json(&format!("/capport/sessions/{}", id)).await;
    assert_eq!(status["state"]["permitted"], false);
    assert!(status["requirements"].as_array().unwrap().is_empty());
    assert!(status.get("token").is_none());
    assert!(status["state"].get("bytes_remaining").is_none());
}

#[tokio::test]
async fn unlimited_sessions_report_no_remaining_bytes() {
    let mut config = Config::default();
    config.session_data_limit = 0;
    let context = TestContext::with_config(config);

    let (_, created) = context.create_session(r#"{"identity":"dave"}"#).await;
    let id = session_id(&created);
    context.get(&format!("/terms?session={}&accept=1", id)).await;
    context.get(&format!("/login?session={}&password=x", id)).await;

    context.usage.0.store(u64::MAX, Ordering::SeqCst);
    let (_, status) = context.get_json(&format!("/capport/sessions/{}", id)).await;
    assert_eq!(status["state"]["permitted"], true);
    assert!(status["state"].get("bytes_remaining").is_none());
}

#[tokio::test]
async fn expired_sessions_stay_queryable_but_are_not_permitted() {
    let context = TestContext::new();
    let (_, created) = context.create_session(r#"{"identity":"erin"}"#).await;
    let id: Uuid = session_id(&created).parse().unwrap();

    context.requirements.delete_all_by_session(id).await.unwrap();
    let mut session = context.sessions.load(id).await.unwrap().unwrap();
    session.expire = chrono::Utc::now() - chrono::Duration::seconds(1);
    context.sessions.save(&session).await.unwrap();

    let (status, body) = context.get_json(&format!("/capport/sessions/{}", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"]["permitted"], false);
    assert!(body["state"].get("expires").is_none());
}

#[tokio::test]
async fn unknown_sessions_are_rejected_without_creating_state() {
    let context = TestContext::new();
    let unknown = Uuid::new_v4();

    let (status, body) = context.get_json(&format!("/capport/sessions/{}", unknown)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "error": "invalid session" }));

    let (status, body) = context.get_json("/capport/sessions/not-a-uuid").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "error": "invalid session" }));

    assert!(context.sessions.load(unknown).await.unwrap().is_none());
    assert!(context.requirements.list_by_session(unknown).await.unwrap().is_empty());
}

#[tokio::test]
async fn create_rejects_bad_payloads() {
    let context = TestContext::new();

    let (status, body) = context.create_session("{not json").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "error": "invalid json payload" }));

    let (status, body) = context.create_session(r#"{"name":"alice"}"#).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "error": "identity missing" }));
}

#[tokio::test]
async fn failed_creation_is_rolled_back() {
    let flaky = Arc::new(FlakyRequirements::default());
    let requirements: Arc<dyn RequirementStore> = flaky.clone();
    let sessions: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new(requirements.clone()));
    let context = TestContext::with_stores(Config::default(), sessions, requirements);

    let (status, body) = context.create_session(r#"{"identity":"frank"}"#).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "error": "could not initiate session" }));

    let seen = flaky.seen.lock().unwrap().clone();
    assert!(!seen.is_empty());
    for id in seen {
        assert!(context.sessions.load(id).await.unwrap().is_none());
        assert!(context.requirements.list_by_session(id).await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn delete_removes_session_and_requirements() {
    let context = TestContext::new();
    let (_, created) = context.create_session(r#"{"identity":"grace"}"#).await;
    let id = session_id(&created);

    let (status, body) = context.delete_session(&id).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_empty());

    let uuid: Uuid = id.parse().unwrap();
    assert!(context.requirements.list_by_session(uuid).await.unwrap().is_empty());

    let (status, body) = context.get_json(&format!("/capport/sessions/{}", id)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "invalid session");

    let (status, _) = context.delete_session(&id).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn portal_pages_prompt_and_complete() {
    let context = TestContext::new();
    let (_, created) = context.create_session(r#"{"identity":"heidi"}"#).await;
    let id = session_id(&created);

    let (status, headers, page) = context.get(&format!("/terms?session={}", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CACHE_CONTROL], "no-store");
    let page = String::from_utf8(page).unwrap();
    assert!(page.contains("<form method=\"post\""));
    assert!(page.contains(&id));

    // The prompt alone satisfies nothing.
    let (_, status_doc) = context.get_json(&format!("/capport/sessions/{}", id)).await;
    assert_eq!(requirement_kinds(&status_doc).len(), 2);

    // Form submission completes the requirement.
    let (status, _, page) = context
        .send(
            Request::post("/terms")
                .header(header::HOST, HOST)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(format!("session={}&accept=yes", id)))
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(page).unwrap().contains("Terms accepted"));

    // A replayed completion is harmless.
    let (status, _, _) = context.get(&format!("/terms?session={}&accept=yes", id)).await;
    assert_eq!(status, StatusCode::OK);

    let (_, status_doc) = context.get_json(&format!("/capport/sessions/{}", id)).await;
    assert_eq!(requirement_kinds(&status_doc), vec!["provide_credentials"]);
}

#[tokio::test]
async fn portal_pages_reject_unknown_sessions() {
    let context = TestContext::new();

    for uri in [
        "/terms".to_string(),
        "/terms?session=garbage&accept=yes".to_string(),
        format!("/login?session={}&password=x", Uuid::new_v4()),
    ] {
        let (status, _, page) = context.get(&uri).await;
        assert_eq!(status, StatusCode::OK);
        assert!(String::from_utf8(page).unwrap().contains("Invalid session"), "{uri}");
    }
    assert!(context.traffic.enabled().is_empty());
}
