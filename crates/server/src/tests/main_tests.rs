use super::*;
use async_trait::async_trait;
use axum::{body, body::Body, http::Request, response::Response};
use serde_json::{json, Value};
use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};
use tower::ServiceExt;
use upstream::{
    ConfigPublisher, FetchError, ObsStateError, ObsStateSource, PublishError,
    StatusCode as UpstreamStatus,
};

#[derive(Default)]
struct FakeOrchestrator {
    fail: AtomicBool,
    pushes: tokio::sync::Mutex<Vec<Vec<TriggerOrch>>>,
}

#[async_trait]
impl ConfigPublisher for FakeOrchestrator {
    async fn publish(&self, triggers: &[TriggerOrch]) -> Result<(), PublishError> {
        self.pushes.lock().await.push(triggers.to_vec());
        if self.fail.load(Ordering::SeqCst) {
            return Err(PublishError::Status(UpstreamStatus::INTERNAL_SERVER_ERROR));
        }
        Ok(())
    }
}

struct FakeObs(Option<Value>);

#[async_trait]
impl ObsStateSource for FakeObs {
    async fn fetch_state(&self) -> Result<ObsState, ObsStateError> {
        self.0
            .clone()
            .map(ObsState)
            .ok_or(ObsStateError::Unavailable {
                attempts: 3,
                source: FetchError::Status(UpstreamStatus::BAD_GATEWAY),
            })
    }
}

async fn test_app_with(obs: Option<Value>) -> (Router, Arc<FakeOrchestrator>) {
    let store: Arc<dyn TriggerStore> =
        Arc::new(Storage::new("sqlite::memory:").await.expect("db"));
    let orchestrator = Arc::new(FakeOrchestrator::default());
    let api = ApiContext {
        store: store.clone(),
        sync: SyncHandle::spawn(store, orchestrator.clone(), Duration::ZERO),
        obs: Arc::new(FakeObs(obs)),
    };
    (build_router(Arc::new(AppState { api })), orchestrator)
}

async fn test_app() -> (Router, Arc<FakeOrchestrator>) {
    test_app_with(None).await
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn get_request(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).expect("request")
}

async fn body_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

fn trigger_a() -> Value {
    json!({
        "hotcueType": ["Hot_Cue"],
        "cueColor": ["Red", "Blue"],
        "decks": [1, 2],
        "cueName": "A",
        "cueMatchType": "Exact"
    })
}

fn scene_action() -> Value {
    json!({"appId": "obs", "actionType": "scene", "actionArgs": "{}"})
}

#[tokio::test]
async fn health_reports_ok_when_storage_is_ready() {
    let (app, _) = test_app().await;
    let response = app.oneshot(get_request("/health")).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(body.as_ref(), b"ok");
}

#[tokio::test]
async fn trigger_and_action_routes_drive_the_payload() {
    let (app, orchestrator) = test_app().await;

    let response = app
        .clone()
        .oneshot(json_request("POST", "/triggers", trigger_a()))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    assert_eq!(created["cueColor"], 0x40 | 0x2000);
    assert_eq!(created["enabled"], true);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/actions",
            json!({"trigger": trigger_a(), "action": scene_action()}),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .clone()
        .oneshot(get_request("/orchestrator/payload"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!([{
            "hotCueType": {"Hot_Cue": true},
            "cueMatchType": "Exact",
            "cueColor": {"64": true, "8192": true},
            "decks": {"1": true, "2": true},
            "cueName": "A",
            "actions": [{"appId": "obs", "actionType": "scene", "args": {}}]
        }])
    );
    assert_eq!(orchestrator.pushes.lock().await.len(), 2);

    let response = app
        .clone()
        .oneshot(get_request("/getConfigState"))
        .await
        .expect("response");
    let state = body_json(response).await;
    assert_eq!(state["config"][0]["trigger"]["cueName"], "A");
    assert_eq!(state["config"][0]["actions"][0]["appId"], "obs");

    let response = app
        .oneshot(json_request("DELETE", "/triggers", trigger_a()))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await["message"],
        "Trigger removed successfully"
    );
    assert!(orchestrator
        .pushes
        .lock()
        .await
        .last()
        .expect("push")
        .is_empty());
}

#[tokio::test]
async fn duplicate_trigger_returns_conflict() {
    let (app, _) = test_app().await;
    app.clone()
        .oneshot(json_request("POST", "/triggers", trigger_a()))
        .await
        .expect("response");

    let response = app
        .oneshot(json_request("POST", "/triggers", trigger_a()))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["code"], "conflict");
}

#[tokio::test]
async fn missing_targets_return_not_found() {
    let (app, _) = test_app().await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/triggers/enabled",
            json!({"trigger": trigger_a(), "enabled": false}),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "not_found");

    app.clone()
        .oneshot(json_request("POST", "/triggers", trigger_a()))
        .await
        .expect("response");
    let response = app
        .oneshot(json_request(
            "DELETE",
            "/actions",
            json!({"trigger": trigger_a(), "action": scene_action()}),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_flag_in_import_is_bad_request() {
    let (app, orchestrator) = test_app().await;
    let response = app
        .oneshot(json_request(
            "POST",
            "/configState",
            json!({"config": [{"trigger": {"cueColor": ["Teal"]}, "actions": []}]}),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "validation");
    assert!(orchestrator.pushes.lock().await.is_empty());
}

#[tokio::test]
async fn import_then_export_round_trips() {
    let (app, _) = test_app().await;
    let config = json!({"config": [
        {"trigger": {
            "hotcueType": 1, "cueColor": 64, "decks": 3, "cueName": "A",
            "enabled": true, "cueMatchType": "Exact"
        }, "actions": [{"appId": "obs", "actionType": "scene", "actionArgs": "{}"}]},
        {"trigger": {
            "hotcueType": 2, "cueColor": 65535, "decks": 15, "cueName": "",
            "enabled": false, "cueMatchType": "None"
        }, "actions": []}
    ]});

    let response = app
        .clone()
        .oneshot(json_request("POST", "/configState", config.clone()))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(get_request("/getConfigState"))
        .await
        .expect("response");
    assert_eq!(body_json(response).await, config);
}

#[tokio::test]
async fn failed_push_returns_bad_gateway_and_keeps_change() {
    let (app, orchestrator) = test_app().await;
    orchestrator.fail.store(true, Ordering::SeqCst);

    let response = app
        .clone()
        .oneshot(json_request("POST", "/triggers", trigger_a()))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_json(response).await["code"], "sync_failure");

    let response = app
        .clone()
        .oneshot(get_request("/getConfigState"))
        .await
        .expect("response");
    assert_eq!(body_json(response).await["config"].as_array().map(Vec::len), Some(1));

    orchestrator.fail.store(false, Ordering::SeqCst);
    let response = app
        .clone()
        .oneshot(Request::post("/sync").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(get_request("/sync/status"))
        .await
        .expect("response");
    let status = body_json(response).await;
    assert_eq!(status["pushes"], 1);
    assert_eq!(status["failures"], 1);
    assert_eq!(status["lastTriggerCount"], 1);
}

#[tokio::test]
async fn obs_state_is_relayed_verbatim() {
    let state = json!({"currentScene": "Intro", "streaming": true});
    let (app, _) = test_app_with(Some(state.clone())).await;

    let response = app.oneshot(get_request("/obsState")).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, state);
}

#[tokio::test]
async fn unavailable_obs_state_is_503_without_body() {
    let (app, _) = test_app().await;

    let response = app.oneshot(get_request("/obsState")).await.expect("response");
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert!(body.is_empty());
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let (app, _) = test_app().await;
    let padding = "x".repeat(MAX_BODY_BYTES + 1);
    let request = Request::post("/configState")
        .header("content-type", "application/json")
        .header("content-length", padding.len())
        .body(Body::from(padding))
        .expect("request");

    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}
