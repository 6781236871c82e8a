//! HTTP request handlers

use std::sync::Arc;

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, WebSocketUpgrade},
        Path, State,
    },
    http::{HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use openapi_client::models::{
    DeploymentConnectionResponse, DeploymentRequest, DeploymentResponse, DeploymentStatusResponse,
};
use openapi_server::models::{
    BridgeView, ConnectionView, ErrorResponse, HealthResponse, OpenConnectionRequest,
    SessionResponse, VersionResponse,
};
use tracing::error;

use crate::app::sessions::Session;
use crate::bridge::controller::idle_view;
use crate::errors::GatewayError;
use crate::server::state::ServerState;
use crate::utils::version_info;

impl GatewayError {
    /// HTTP status this error is reported with
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::ConfigError(_)
            | GatewayError::ServerError(_)
            | GatewayError::ShutdownError(_)
            | GatewayError::IoError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            GatewayError::TransportError(_)
            | GatewayError::WebSocketError(_)
            | GatewayError::ProtocolError(_)
            | GatewayError::DecodeError { .. }
            | GatewayError::JsonError(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            GatewayError::ConfigError(_) => "configuration_error",
            GatewayError::ValidationError(_) => "validation_error",
            GatewayError::NotFound(_) => "not_found",
            GatewayError::Timeout(_) => "timeout",
            GatewayError::Upstream { .. } => "upstream_error",
            GatewayError::DecodeError { .. } => "decode_error",
            GatewayError::TransportError(_) | GatewayError::WebSocketError(_) => "transport_error",
            GatewayError::ProtocolError(_) | GatewayError::JsonError(_) => "protocol_error",
            GatewayError::IoError(_)
            | GatewayError::ServerError(_)
            | GatewayError::ShutdownError(_) => "internal_error",
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }

        let details = match &self {
            GatewayError::DecodeError { status: code, body }
            | GatewayError::Upstream { status: code, body } => {
                Some(serde_json::json!({ "status": code, "body": body }))
            }
            _ => None,
        };
        let body = ErrorResponse {
            error: self.code().to_string(),
            message: self.to_string(),
            details,
        };
        (status, Json(body)).into_response()
    }
}

fn find_session(state: &ServerState, session_id: &str) -> Result<Arc<Session>, GatewayError> {
    state
        .sessions
        .get(session_id)
        .ok_or_else(|| GatewayError::NotFound(format!("Session {} not found", session_id)))
}

// ================================= HEALTH ======================================= //

/// Health check handler
pub async fn health_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "a8s-gateway".to_string(),
        version: version.version,
        sessions: state.sessions.len(),
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

// =============================== DEPLOYMENTS ===================================== //

/// Create a deployment and return the Overseer's answer untouched
pub async fn deploy_handler(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<DeploymentRequest>,
) -> Result<Json<DeploymentResponse>, GatewayError> {
    let response = state.overseer.deploy(&request).await?;
    Ok(Json(response))
}

pub async fn get_deployment_handler(
    State(state): State<Arc<ServerState>>,
    Path(deployment_id): Path<String>,
) -> Result<Json<DeploymentResponse>, GatewayError> {
    let response = state.overseer.get_deployment(&deployment_id).await?;
    Ok(Json(response))
}

pub async fn get_deployment_status_handler(
    State(state): State<Arc<ServerState>>,
    Path(deployment_id): Path<String>,
) -> Result<Json<DeploymentStatusResponse>, GatewayError> {
    let response = state.overseer.get_deployment_status(&deployment_id).await?;
    Ok(Json(response))
}

pub async fn get_deployment_connection_handler(
    State(state): State<Arc<ServerState>>,
    Path(deployment_id): Path<String>,
) -> Result<Json<DeploymentConnectionResponse>, GatewayError> {
    let response = state.overseer.get_deployment_connection(&deployment_id).await?;
    Ok(Json(response))
}

pub async fn delete_deployment_handler(
    State(state): State<Arc<ServerState>>,
    Path(deployment_id): Path<String>,
) -> Result<StatusCode, GatewayError> {
    state.overseer.delete_deployment(&deployment_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ================================= SESSIONS ===================================== //

pub async fn create_session_handler(
    State(state): State<Arc<ServerState>>,
) -> impl IntoResponse {
    let session = state.sessions.create().await;
    (
        StatusCode::CREATED,
        Json(SessionResponse {
            session_id: session.id.clone(),
        }),
    )
}

pub async fn delete_session_handler(
    State(state): State<Arc<ServerState>>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, GatewayError> {
    state
        .sessions
        .remove(&session_id)
        .await
        .ok_or_else(|| GatewayError::NotFound(format!("Session {} not found", session_id)))?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================== CONNECTION ===================================== //

pub async fn get_connection_handler(
    State(state): State<Arc<ServerState>>,
    Path(session_id): Path<String>,
) -> Result<Json<ConnectionView>, GatewayError> {
    let session = find_session(&state, &session_id)?;
    Ok(Json(ConnectionView::from(&session.store().read())))
}

/// Open a connection from an explicit service address
pub async fn open_connection_handler(
    State(state): State<Arc<ServerState>>,
    Path(session_id): Path<String>,
    Json(request): Json<OpenConnectionRequest>,
) -> Result<Json<ConnectionView>, GatewayError> {
    let session = find_session(&state, &session_id)?;
    let opened = session.store().open_connection(
        &request.service_address,
        &request.environment_type,
        &request.deployment_id,
        request.bounding_box,
    )?;
    Ok(Json(ConnectionView::from(&opened)))
}

/// Open the connection described by a deployment response
pub async fn open_deployment_connection_handler(
    State(state): State<Arc<ServerState>>,
    Path(session_id): Path<String>,
    Json(deployment): Json<DeploymentResponse>,
) -> Result<Json<ConnectionView>, GatewayError> {
    let session = find_session(&state, &session_id)?;
    let opened = session.store().open_deployment(&deployment, None)?;
    Ok(Json(ConnectionView::from(&opened)))
}

/// Open a running deployment by id.
///
/// The Overseer only reports connection details once the deployment is up,
/// so they are fetched from `/connect` rather than taken from the deployment.
pub async fn open_deployment_by_id_handler(
    State(state): State<Arc<ServerState>>,
    Path((session_id, deployment_id)): Path<(String, String)>,
) -> Result<Json<ConnectionView>, GatewayError> {
    let session = find_session(&state, &session_id)?;
    let mut deployment = state.overseer.get_deployment(&deployment_id).await?;
    let connection = state.overseer.get_deployment_connection(&deployment_id).await?;
    deployment.connection_details = Some(connection.connection_details);

    let opened = session.store().open_deployment(&deployment, None)?;
    Ok(Json(ConnectionView::from(&opened)))
}

pub async fn close_connection_handler(
    State(state): State<Arc<ServerState>>,
    Path(session_id): Path<String>,
) -> Result<Json<ConnectionView>, GatewayError> {
    let session = find_session(&state, &session_id)?;
    let closed = session.store().close_connection();
    Ok(Json(ConnectionView::from(&closed)))
}

pub async fn bridge_handler(
    State(state): State<Arc<ServerState>>,
    Path(session_id): Path<String>,
) -> Result<Json<BridgeView>, GatewayError> {
    let session = find_session(&state, &session_id)?;
    let view = match session.bridge() {
        Some(status) => status.view(),
        None => idle_view(state.sessions.bridge_options()),
    };
    Ok(Json(view))
}

// ================================= TUNNEL ======================================= //

/// `/{serviceAddress}/websockify`
pub async fn tunnel_handler(
    State(state): State<Arc<ServerState>>,
    uri: Uri,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    state.tunnel.forward(&uri, &headers, ws).await
}

/// JSON 404 for everything else
pub async fn not_found_handler(uri: Uri) -> GatewayError {
    GatewayError::NotFound(format!("No route for {}", uri.path()))
}
