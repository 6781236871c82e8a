//! HTTP API tests

use std::sync::Arc;
use std::time::Duration;

use a8s_gateway::app::sessions::SessionRegistry;
use a8s_gateway::bridge::session::BridgeOptions;
use a8s_gateway::http::client::OverseerClient;
use a8s_gateway::server::serve::router;
use a8s_gateway::server::state::ServerState;
use a8s_gateway::tunnel::proxy::{Tunnel, TunnelOptions};
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::common::{FakeVncServer, ADDRESS};

pub fn app(origin: url::Url) -> Router {
    gateway(origin, None, TunnelOptions::default())
}

pub fn gateway(origin: url::Url, overseer: Option<&str>, tunnel: TunnelOptions) -> Router {
    let state = ServerState::new(
        Arc::new(OverseerClient::new(overseer, Duration::from_secs(5)).unwrap()),
        Arc::new(SessionRegistry::new(4, BridgeOptions::new(origin))),
        Arc::new(Tunnel::new(&tunnel)),
    );
    router(Arc::new(state))
}

pub async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(body) => {
            request = request.header(header::CONTENT_TYPE, "application/json");
            Body::from(body.to_string())
        }
        None => Body::empty(),
    };
    let response = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn create_session(app: &Router) -> String {
    let (status, body) = call(app, Method::POST, "/api/sessions", None).await;
    assert_eq!(status, StatusCode::CREATED);
    body["session_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_counts_sessions() {
    let app = app(url::Url::parse("http://localhost:8080").unwrap());
    create_session(&app).await;

    let (status, body) = call(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["sessions"], 1);
}

#[tokio::test]
async fn test_deploy_without_overseer() {
    let app = app(url::Url::parse("http://localhost:8080").unwrap());
    let (status, body) = call(
        &app,
        Method::POST,
        "/api/deployments",
        Some(json!({"environment_type": "claude", "requirement": "research X"})),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "configuration_error");
}

#[tokio::test]
async fn test_session_lifecycle() {
    let app = app(url::Url::parse("http://localhost:8080").unwrap());
    let id = create_session(&app).await;
    let connection = format!("/api/sessions/{}/connection", id);

    let (status, body) = call(&app, Method::GET, &connection, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_visible"], false);
    assert_eq!(body["status"], "disconnected");
    assert_eq!(body["attempt"], 0);

    let (status, body) = call(
        &app,
        Method::POST,
        &connection,
        Some(json!({
            "service_address": "novnc",
            "environment_type": "claude",
            "deployment_id": "d-1",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_error");

    let (status, body) = call(&app, Method::GET, &format!("/api/sessions/{}/bridge", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["phase"], "idle");
    assert_eq!(body["viewport_width"], 1280);

    let (status, _) = call(&app, Method::DELETE, &format!("/api/sessions/{}", id), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, body) = call(&app, Method::DELETE, &format!("/api/sessions/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_open_connection_reaches_connected() {
    let server = FakeVncServer::start().await;
    let app = app(server.origin());
    let id = create_session(&app).await;
    let connection = format!("/api/sessions/{}/connection", id);

    let (status, body) = call(
        &app,
        Method::POST,
        &connection,
        Some(json!({
            "service_address": ADDRESS,
            "environment_type": "claude",
            "deployment_id": "d-1",
            "bounding_box": {"top": 10.0, "left": 20.0, "width": 640.0, "height": 360.0},
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "connecting");
    assert_eq!(body["attempt"], 1);
    assert_eq!(body["bounding_box"]["width"], 640.0);

    let mut connected = false;
    for _ in 0..100 {
        let (_, body) = call(&app, Method::GET, &connection, None).await;
        if body["status"] == "connected" {
            connected = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(connected);

    let (_, bridge) = call(&app, Method::GET, &format!("/api/sessions/{}/bridge", id), None).await;
    assert_eq!(bridge["phase"], "ready");
    assert_eq!(bridge["framebuffer_width"], 4);

    let (status, body) = call(&app, Method::DELETE, &connection, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_visible"], false);
    assert_eq!(body["attempt"], 1);
}

#[tokio::test]
async fn test_open_deployment_without_details() {
    let app = app(url::Url::parse("http://localhost:8080").unwrap());
    let id = create_session(&app).await;

    let (status, body) = call(
        &app,
        Method::POST,
        &format!("/api/sessions/{}/connection/deployment", id),
        Some(json!({
            "id": "d-2",
            "status": "provisioning",
            "environment_type": "claude",
            "created_at": "2024-01-01T00:00:00Z",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_error");
}
