//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::GatewayError;
use crate::server::handlers::{
    bridge_handler, close_connection_handler, create_session_handler, delete_deployment_handler,
    delete_session_handler, deploy_handler, get_connection_handler,
    get_deployment_connection_handler, get_deployment_handler, get_deployment_status_handler,
    health_handler, not_found_handler, open_connection_handler, open_deployment_by_id_handler,
    open_deployment_connection_handler, tunnel_handler, version_handler,
};
use crate::server::state::ServerState;

/// Build the gateway router
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        // Health and version
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        // Deployments
        .route("/api/deployments", post(deploy_handler))
        .route(
            "/api/deployments/{deployment_id}",
            get(get_deployment_handler).delete(delete_deployment_handler),
        )
        .route(
            "/api/deployments/{deployment_id}/status",
            get(get_deployment_status_handler),
        )
        .route(
            "/api/deployments/{deployment_id}/connect",
            get(get_deployment_connection_handler),
        )
        // Sessions
        .route("/api/sessions", post(create_session_handler))
        .route("/api/sessions/{session_id}", delete(delete_session_handler))
        .route(
            "/api/sessions/{session_id}/connection",
            get(get_connection_handler)
                .post(open_connection_handler)
                .delete(close_connection_handler),
        )
        .route(
            "/api/sessions/{session_id}/connection/deployment",
            post(open_deployment_connection_handler),
        )
        .route(
            "/api/sessions/{session_id}/connection/deployment/{deployment_id}",
            post(open_deployment_by_id_handler),
        )
        .route("/api/sessions/{session_id}/bridge", get(bridge_handler))
        // Tunnel
        .route("/{service_address}/websockify", get(tunnel_handler))
        .fallback(not_found_handler)
        // State and middleware
        .with_state(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), GatewayError>>, GatewayError> {
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| GatewayError::ServerError(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| GatewayError::ServerError(e.to_string()))
    });

    Ok(handle)
}
