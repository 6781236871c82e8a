//! HTTP client for the Overseer control plane

use std::time::Duration;

use openapi_client::models::{ErrorResponse, HealthResponse};
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error};

use crate::errors::GatewayError;

/// Environment variable holding the Overseer base URL
pub const OVERSEER_ENDPOINT_ENV: &str = "OVERSEER_API_ENDPOINT";

/// HTTP client for Overseer communication.
///
/// A client without an endpoint can be constructed; every call on it fails
/// with [`GatewayError::ConfigError`] before touching the network.
pub struct OverseerClient {
    client: Client,
    endpoint: Option<String>,
}

impl OverseerClient {
    /// Create a new Overseer client
    pub fn new(endpoint: Option<&str>, timeout: Duration) -> Result<Self, GatewayError> {
        let client = Client::builder().timeout(timeout).build()?;

        let endpoint = endpoint
            .map(|e| e.trim().trim_end_matches('/').to_string())
            .filter(|e| !e.is_empty());

        Ok(Self { client, endpoint })
    }

    /// Create a client whose endpoint comes from `OVERSEER_API_ENDPOINT`
    pub fn from_env(timeout: Duration) -> Result<Self, GatewayError> {
        let endpoint = std::env::var(OVERSEER_ENDPOINT_ENV).ok();
        Self::new(endpoint.as_deref(), timeout)
    }

    /// Get the configured endpoint
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    /// Check that the Overseer answers its health endpoint
    pub async fn health(&self) -> Result<HealthResponse, GatewayError> {
        self.get("/").await
    }

    fn url(&self, path: &str) -> Result<String, GatewayError> {
        match &self.endpoint {
            Some(endpoint) => Ok(format!("{}{}", endpoint, path)),
            None => Err(GatewayError::ConfigError(format!(
                "Overseer endpoint is not configured (set {})",
                OVERSEER_ENDPOINT_ENV
            ))),
        }
    }

    /// Make a POST request and decode the body whatever the HTTP status
    pub(crate) async fn post_verbatim<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, GatewayError> {
        let url = self.url(path)?;
        debug!("POST {}", url);

        let response = self.client.post(&url).json(body).send().await?;
        decode_verbatim(response).await
    }

    /// Make a GET request
    pub(crate) async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, GatewayError> {
        let url = self.url(path)?;
        debug!("GET {}", url);

        let response = self.client.get(&url).send().await?;
        let response = check_status("GET", response).await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|_| GatewayError::DecodeError { status, body })
    }

    /// Make a DELETE request
    pub(crate) async fn delete(&self, path: &str) -> Result<(), GatewayError> {
        let url = self.url(path)?;
        debug!("DELETE {}", url);

        let response = self.client.delete(&url).send().await?;
        check_status("DELETE", response).await?;
        Ok(())
    }
}

async fn decode_verbatim<T: DeserializeOwned>(response: Response) -> Result<T, GatewayError> {
    let status = response.status().as_u16();
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|_| GatewayError::DecodeError { status, body })
}

async fn check_status(method: &str, response: Response) -> Result<Response, GatewayError> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    error!("HTTP {} failed: {} - {}", method, status, body);

    // FastAPI wraps errors as {"detail": ...}
    let body = match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(ErrorResponse {
            detail: serde_json::Value::String(detail),
        }) => detail,
        Ok(ErrorResponse { detail }) => detail.to_string(),
        Err(_) => body,
    };

    Err(GatewayError::Upstream {
        status: status.as_u16(),
        body,
    })
}
