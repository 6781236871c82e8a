//! Connection state store
//!
//! One store per session; every surface that shows or changes the
//! remote-desktop connection goes through it instead of keeping a copy.

use openapi_client::models::DeploymentResponse;
use openapi_server::models::BoundingBox;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::address::ServiceAddress;
use crate::errors::GatewayError;
use crate::models::connection::{ConnectionStatus, VmConnectionState};
use crate::models::deployment::deployment_service_address;
use crate::store::shared::{SharedState, Selector};

/// Projection the bridge controller mounts sessions from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountRequest {
    pub deployment_id: String,
    pub service_address: ServiceAddress,
    pub attempt: u64,
}

pub fn mount_request(state: &VmConnectionState) -> Option<MountRequest> {
    if !state.wants_session() {
        return None;
    }
    state.service_address.as_ref().map(|address| MountRequest {
        deployment_id: state.deployment_id.clone(),
        service_address: address.clone(),
        attempt: state.attempt,
    })
}

/// Store of a session's remote-desktop connection
#[derive(Default)]
pub struct VmConnectionStore {
    state: SharedState<VmConnectionState>,
}

impl VmConnectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self) -> VmConnectionState {
        self.state.read()
    }

    pub fn write<F>(&self, updater: F) -> VmConnectionState
    where
        F: FnOnce(&VmConnectionState) -> VmConnectionState,
    {
        self.state.write(updater)
    }

    pub fn subscribe(&self) -> watch::Receiver<VmConnectionState> {
        self.state.subscribe()
    }

    pub fn select<P, F>(&self, project: F) -> Selector<VmConnectionState, P, F>
    where
        P: Clone + PartialEq,
        F: Fn(&VmConnectionState) -> P,
    {
        self.state.select(project)
    }

    /// Show the overlay for a deployment and start connecting to it.
    ///
    /// The address is validated before anything is written.
    pub fn open_connection(
        &self,
        service_address: &str,
        environment_type: &str,
        deployment_id: &str,
        bounding_box: Option<BoundingBox>,
    ) -> Result<VmConnectionState, GatewayError> {
        let service_address = ServiceAddress::parse(service_address)?;
        Ok(self.open(service_address, environment_type, deployment_id, bounding_box))
    }

    /// Open the connection described by a deployment response
    pub fn open_deployment(
        &self,
        deployment: &DeploymentResponse,
        bounding_box: Option<BoundingBox>,
    ) -> Result<VmConnectionState, GatewayError> {
        let service_address = deployment_service_address(deployment)?;
        Ok(self.open(
            service_address,
            &deployment.environment_type,
            &deployment.id,
            bounding_box,
        ))
    }

    fn open(
        &self,
        service_address: ServiceAddress,
        environment_type: &str,
        deployment_id: &str,
        bounding_box: Option<BoundingBox>,
    ) -> VmConnectionState {
        let state = self.write(|current| VmConnectionState {
            deployment_id: deployment_id.to_string(),
            environment_type: environment_type.to_string(),
            service_address: Some(service_address),
            is_visible: true,
            status: ConnectionStatus::Connecting,
            bounding_box: bounding_box.unwrap_or_default(),
            attempt: current.attempt + 1,
        });
        info!(
            deployment_id = %state.deployment_id,
            attempt = state.attempt,
            "Connection opened"
        );
        state
    }

    /// Hide the overlay and reset the connection
    pub fn close_connection(&self) -> VmConnectionState {
        let state = self.write(|current| VmConnectionState {
            attempt: current.attempt,
            ..VmConnectionState::default()
        });
        info!("Connection closed");
        state
    }

    /// Record that the remote desktop for `attempt` is streaming.
    ///
    /// Ignored when the state has moved on to another open in the meantime.
    pub fn mark_connected(&self, deployment_id: &str, attempt: u64) -> bool {
        self.transition(deployment_id, attempt, ConnectionStatus::Connected)
    }

    /// Record that the remote desktop for `attempt` failed
    pub fn mark_disconnected(&self, deployment_id: &str, attempt: u64) -> bool {
        self.transition(deployment_id, attempt, ConnectionStatus::Disconnected)
    }

    fn transition(&self, deployment_id: &str, attempt: u64, status: ConnectionStatus) -> bool {
        let mut applied = false;
        self.write(|current| {
            if !current.is_visible || !current.is_attempt(deployment_id, attempt) {
                return current.clone();
            }
            applied = true;
            VmConnectionState {
                status,
                ..current.clone()
            }
        });
        if !applied {
            debug!(deployment_id, attempt, "Dropping stale status update");
        }
        applied
    }
}
