//! Overseer client tests against a mock control plane

use std::time::Duration;

use a8s_gateway::bridge::session::{derive_websocket_url, BridgeOptions, BridgePhase};
use a8s_gateway::errors::GatewayError;
use a8s_gateway::http::client::OverseerClient;
use a8s_gateway::models::connection::ConnectionStatus;
use a8s_gateway::models::deployment::deployment_service_address;
use a8s_gateway::store::connection::VmConnectionStore;
use a8s_gateway::tunnel::proxy::TunnelOptions;
use axum::extract::Path;
use axum::http::{Method, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use openapi_client::models::{DeploymentRequest, DeploymentStatus};
use serde_json::{json, Value};
use tokio_test::{assert_err, assert_ok};

use crate::common::{eventually, serve_router, FakeVncServer, ADDRESS};
use crate::test_server::{call, gateway};

const TIMEOUT: Duration = Duration::from_secs(5);

fn research_request() -> DeploymentRequest {
    DeploymentRequest::new("claude", "research X")
        .with_tools(["browser"])
        .with_ttl_seconds(1800)
}

async fn overseer(response: Value) -> OverseerClient {
    let router = Router::new()
        .route(
            "/deployments",
            post(move |Json(request): Json<Value>| {
                let response = response.clone();
                async move {
                    assert_eq!(request["environment_type"], "claude");
                    Json(response)
                }
            }),
        )
        .route(
            "/deployments/{id}",
            get(|| async { (StatusCode::NOT_FOUND, Json(json!({"detail": "Deployment not found"}))) }),
        );
    let addr = serve_router(router).await;
    OverseerClient::new(Some(&format!("http://{}/", addr)), TIMEOUT).unwrap()
}

#[tokio::test]
async fn test_deploy_without_endpoint_is_a_configuration_error() {
    let client = OverseerClient::new(None, TIMEOUT).unwrap();
    let err = assert_err!(client.deploy(&research_request()).await);
    assert!(matches!(err, GatewayError::ConfigError(_)));
}

#[tokio::test]
async fn test_failed_deployment_is_returned_verbatim() {
    let client = overseer(json!({
        "id": "d-9",
        "status": "failed",
        "environment_type": "claude",
        "created_at": "2024-01-01T00:00:00Z",
        "message": "quota exceeded",
    }))
    .await;

    let response = assert_ok!(client.deploy(&research_request()).await);
    assert_eq!(response.id, "d-9");
    assert_eq!(response.status, DeploymentStatus::Failed);
    assert_eq!(response.message.as_deref(), Some("quota exceeded"));
    assert!(response.connection_details.is_none());
}

#[tokio::test]
async fn test_unexpected_body_is_a_decode_error() {
    let client = overseer(json!({"ok": true})).await;
    match client.deploy(&research_request()).await {
        Err(GatewayError::DecodeError { status, body }) => {
            assert_eq!(status, 200);
            assert!(body.contains("\"ok\""));
        }
        other => panic!("unexpected result {:?}", other),
    }
}

#[tokio::test]
async fn test_upstream_error_detail_is_unwrapped() {
    let client = overseer(json!({})).await;
    match client.get_deployment("d-404").await {
        Err(GatewayError::Upstream { status, body }) => {
            assert_eq!(status, 404);
            assert_eq!(body, "Deployment not found");
        }
        other => panic!("unexpected result {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_overseer_is_a_transport_error() {
    let client = OverseerClient::new(Some("http://127.0.0.1:1"), TIMEOUT).unwrap();
    let err = assert_err!(client.deploy(&research_request()).await);
    assert!(matches!(err, GatewayError::TransportError(_)));
    assert_eq!(err.kind().as_str(), "transport");
}

#[tokio::test]
async fn test_deploy_to_ready_remote_desktop() {
    let client = overseer(json!({
        "id": "d-1",
        "status": "ready",
        "environment_type": "claude",
        "created_at": "2024-01-01T00:00:00Z",
        "connection_details": {"host": ADDRESS},
    }))
    .await;
    let deployment = assert_ok!(client.deploy(&research_request()).await);
    assert_eq!(deployment.created_at, "2024-01-01T00:00:00Z");

    let address = deployment_service_address(&deployment).unwrap();
    let public = url::Url::parse("https://app.example.com/chat").unwrap();
    assert_eq!(
        derive_websocket_url(&public, &address).unwrap().as_str(),
        "wss://app.example.com/novnc.default.svc.cluster.local/websockify"
    );

    // Open the deployment in a session whose page is served next to the fake desktop
    let server = FakeVncServer::start().await;
    let store = std::sync::Arc::new(VmConnectionStore::new());
    let (status_tx, status_rx) = tokio::sync::watch::channel(None);
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let handle = tokio::spawn(a8s_gateway::bridge::controller::run(
        BridgeOptions::new(server.origin()),
        store.clone(),
        status_tx,
        Box::pin(async move {
            let _ = stop_rx.await;
        }),
    ));

    let opened = store.open_deployment(&deployment, None).unwrap();
    assert_eq!(opened.deployment_id, "d-1");
    assert_eq!(opened.status, ConnectionStatus::Connecting);

    assert!(eventually(|| store.read().status == ConnectionStatus::Connected).await);
    assert!(status_rx
        .borrow()
        .as_ref()
        .is_some_and(|s| s.deployment_id == "d-1" && s.phase == BridgePhase::Ready));

    let _ = stop_tx.send(());
    handle.await.unwrap();
}

/// Overseer with one running deployment, `d-1`, whose details are only
/// available from `/connect`
async fn running_overseer() -> String {
    fn missing(id: &str) -> (StatusCode, Json<Value>) {
        (
            StatusCode::NOT_FOUND,
            Json(json!({"detail": format!("Deployment {} not found", id)})),
        )
    }

    let router = Router::new()
        .route(
            "/deployments/{id}",
            get(|Path(id): Path<String>| async move {
                if id != "d-1" {
                    return missing(&id);
                }
                (
                    StatusCode::OK,
                    Json(json!({
                        "id": "d-1",
                        "status": "running",
                        "environment_type": "claude",
                        "created_at": "2024-01-01T00:00:00",
                        "connection_details": null,
                    })),
                )
            }),
        )
        .route(
            "/deployments/{id}/status",
            get(|Path(id): Path<String>| async move {
                if id != "d-1" {
                    return missing(&id);
                }
                (
                    StatusCode::OK,
                    Json(json!({"id": "d-1", "status": "running", "message": "Pod is ready"})),
                )
            }),
        )
        .route(
            "/deployments/{id}/connect",
            get(|Path(id): Path<String>| async move {
                if id != "d-1" {
                    return missing(&id);
                }
                (
                    StatusCode::OK,
                    Json(json!({
                        "id": "d-1",
                        "connection_details": {
                            "service_url": format!("http://{}:6080", ADDRESS),
                            "novnc_port": "6080",
                        },
                    })),
                )
            }),
        );
    let addr = serve_router(router).await;
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_status_and_connection_details() {
    let endpoint = running_overseer().await;
    let client = OverseerClient::new(Some(&endpoint), TIMEOUT).unwrap();

    let status = assert_ok!(client.get_deployment_status("d-1").await);
    assert_eq!(status.status, DeploymentStatus::Running);
    assert_eq!(status.message.as_deref(), Some("Pod is ready"));

    let connection = assert_ok!(client.get_deployment_connection("d-1").await);
    assert_eq!(
        connection.connection_details.service_url.as_deref(),
        Some("http://novnc.default.svc.cluster.local:6080")
    );

    match client.get_deployment_connection("d-2").await {
        Err(GatewayError::Upstream { status, body }) => {
            assert_eq!(status, 404);
            assert_eq!(body, "Deployment d-2 not found");
        }
        other => panic!("unexpected result {:?}", other),
    }
    assert!(matches!(
        client.get_deployment_status("../admin").await,
        Err(GatewayError::ValidationError(_))
    ));
}

#[tokio::test]
async fn test_gateway_routes_status_and_connect() {
    let endpoint = running_overseer().await;
    let app = gateway(
        url::Url::parse("http://localhost:8080").unwrap(),
        Some(&endpoint),
        TunnelOptions::default(),
    );

    let (status, body) = call(&app, Method::GET, "/api/deployments/d-1/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "running");

    let (status, body) = call(&app, Method::GET, "/api/deployments/d-1/connect", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["connection_details"]["service_url"],
        "http://novnc.default.svc.cluster.local:6080"
    );

    let (status, body) = call(&app, Method::GET, "/api/deployments/d-2/status", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "upstream_error");
}

#[tokio::test]
async fn test_open_running_deployment_by_id() {
    let endpoint = running_overseer().await;
    let app = gateway(
        url::Url::parse("http://localhost:8080").unwrap(),
        Some(&endpoint),
        TunnelOptions::default(),
    );
    let (_, session) = call(&app, Method::POST, "/api/sessions", None).await;
    let session_id = session["session_id"].as_str().unwrap();

    let (status, body) = call(
        &app,
        Method::POST,
        &format!("/api/sessions/{}/connection/deployment/d-1", session_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deployment_id"], "d-1");
    assert_eq!(body["environment_type"], "claude");
    assert_eq!(body["service_address"], ADDRESS);
    assert_eq!(body["is_visible"], true);
    assert_eq!(body["attempt"], 1);

    let (status, _) = call(
        &app,
        Method::POST,
        &format!("/api/sessions/{}/connection/deployment/d-2", session_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
