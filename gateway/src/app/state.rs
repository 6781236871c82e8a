//! Application state management

use std::sync::Arc;

use tracing::info;

use crate::app::options::AppOptions;
use crate::app::sessions::SessionRegistry;
use crate::errors::GatewayError;
use crate::http::client::OverseerClient;
use crate::tunnel::proxy::Tunnel;

/// Main application state
pub struct AppState {
    /// Client for the Overseer deployment API
    pub overseer: Arc<OverseerClient>,

    /// Live sessions
    pub sessions: Arc<SessionRegistry>,

    /// Ingress tunnel
    pub tunnel: Arc<Tunnel>,
}

impl AppState {
    /// Initialize application state
    pub fn init(options: &AppOptions) -> Result<Self, GatewayError> {
        info!("Initializing application state...");

        let overseer = Arc::new(OverseerClient::new(
            options.overseer_endpoint.as_deref(),
            options.overseer_timeout,
        )?);
        match overseer.endpoint() {
            Some(endpoint) => info!("Overseer endpoint: {}", endpoint),
            None => info!("Overseer endpoint not configured; deployments will be rejected"),
        }

        let sessions = Arc::new(SessionRegistry::new(
            options.max_sessions,
            options.bridge.clone(),
        ));
        let tunnel = Arc::new(Tunnel::new(&options.tunnel));

        Ok(Self {
            overseer,
            sessions,
            tunnel,
        })
    }

    /// Shutdown application state
    pub async fn shutdown(&self) -> Result<(), GatewayError> {
        info!("Shutting down application state...");
        self.sessions.shutdown_all().await;
        Ok(())
    }
}
