//! Deployment API client

use openapi_client::models::{
    DeploymentConnectionResponse, DeploymentRequest, DeploymentResponse,
    DeploymentStatusResponse,
};
use tracing::{info, warn};

use crate::errors::GatewayError;
use crate::http::client::OverseerClient;

impl OverseerClient {
    /// Create a deployment (`POST /deployments`).
    ///
    /// The response body is returned as-is, including one that reports
    /// `status: "failed"`. Nothing is retried.
    pub async fn deploy(
        &self,
        request: &DeploymentRequest,
    ) -> Result<DeploymentResponse, GatewayError> {
        info!(
            environment_type = %request.environment_type,
            tools = request.tools.len(),
            "Requesting deployment"
        );

        let response: DeploymentResponse = self.post_verbatim("/deployments", request).await?;

        if response.status.is_failed() {
            warn!(
                id = %response.id,
                message = response.message.as_deref().unwrap_or_default(),
                "Overseer reported a failed deployment"
            );
        } else {
            info!(id = %response.id, status = %response.status, "Deployment created");
        }

        Ok(response)
    }

    /// Get a deployment (`GET /deployments/{id}`)
    pub async fn get_deployment(
        &self,
        deployment_id: &str,
    ) -> Result<DeploymentResponse, GatewayError> {
        let path = format!("/deployments/{}", checked_id(deployment_id)?);
        self.get(&path).await
    }

    /// Get a deployment's status (`GET /deployments/{id}/status`)
    pub async fn get_deployment_status(
        &self,
        deployment_id: &str,
    ) -> Result<DeploymentStatusResponse, GatewayError> {
        let path = format!("/deployments/{}/status", checked_id(deployment_id)?);
        self.get(&path).await
    }

    /// Get a running deployment's connection details (`GET /deployments/{id}/connect`)
    pub async fn get_deployment_connection(
        &self,
        deployment_id: &str,
    ) -> Result<DeploymentConnectionResponse, GatewayError> {
        let path = format!("/deployments/{}/connect", checked_id(deployment_id)?);
        self.get(&path).await
    }

    /// Tear a deployment down (`DELETE /deployments/{id}`)
    pub async fn delete_deployment(&self, deployment_id: &str) -> Result<(), GatewayError> {
        let path = format!("/deployments/{}", checked_id(deployment_id)?);
        self.delete(&path).await?;
        info!(id = %deployment_id, "Deployment deleted");
        Ok(())
    }
}

/// Deployment ids are embedded in a URL path
fn checked_id(deployment_id: &str) -> Result<&str, GatewayError> {
    let valid = !deployment_id.is_empty()
        && deployment_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
        && deployment_id != "."
        && deployment_id != "..";

    if valid {
        Ok(deployment_id)
    } else {
        Err(GatewayError::ValidationError(format!(
            "Invalid deployment id '{}'",
            deployment_id
        )))
    }
}
