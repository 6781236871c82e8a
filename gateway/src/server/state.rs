//! Server state

use std::sync::Arc;

use crate::app::sessions::SessionRegistry;
use crate::http::client::OverseerClient;
use crate::tunnel::proxy::Tunnel;

/// Server state shared across handlers
pub struct ServerState {
    pub overseer: Arc<OverseerClient>,
    pub sessions: Arc<SessionRegistry>,
    pub tunnel: Arc<Tunnel>,
}

impl ServerState {
    pub fn new(
        overseer: Arc<OverseerClient>,
        sessions: Arc<SessionRegistry>,
        tunnel: Arc<Tunnel>,
    ) -> Self {
        Self {
            overseer,
            sessions,
            tunnel,
        }
    }
}
