//! Remote-desktop connection state

use openapi_server::models::{BoundingBox, ConnectionView};
use serde::{Deserialize, Serialize};

use crate::address::ServiceAddress;

/// Connection status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
        }
    }
}

/// The single remote-desktop connection of a session.
///
/// Always replaced as a whole; see [`crate::store::connection::VmConnectionStore`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VmConnectionState {
    pub deployment_id: String,
    pub environment_type: String,
    pub service_address: Option<ServiceAddress>,
    pub is_visible: bool,
    pub status: ConnectionStatus,

    /// Origin rectangle for the overlay transition; cosmetic only
    pub bounding_box: BoundingBox,

    /// Bumped by every open so repeated opens of one deployment differ
    pub attempt: u64,
}

impl VmConnectionState {
    /// Whether a remote-desktop session should be mounted for this state.
    ///
    /// Independent of `status`, so reporting progress never remounts.
    pub fn wants_session(&self) -> bool {
        self.is_visible && self.service_address.is_some()
    }

    /// Whether a state update still refers to the given open
    pub fn is_attempt(&self, deployment_id: &str, attempt: u64) -> bool {
        self.deployment_id == deployment_id && self.attempt == attempt
    }
}

impl From<&VmConnectionState> for ConnectionView {
    fn from(state: &VmConnectionState) -> Self {
        ConnectionView {
            deployment_id: state.deployment_id.clone(),
            environment_type: state.environment_type.clone(),
            service_address: state
                .service_address
                .as_ref()
                .map(|a| a.to_string())
                .unwrap_or_default(),
            is_visible: state.is_visible,
            status: state.status.as_str().to_string(),
            bounding_box: state.bounding_box,
            attempt: state.attempt,
        }
    }
}
