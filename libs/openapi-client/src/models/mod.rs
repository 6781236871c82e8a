//! Overseer API models

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Default lifetime of a deployment, in seconds
pub const DEFAULT_TTL_SECONDS: u64 = 3600;

fn default_ttl() -> Option<u64> {
    Some(DEFAULT_TTL_SECONDS)
}

/// Deployment creation request (`POST /deployments`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRequest {
    /// Environment image family, e.g. "claude"
    pub environment_type: String,

    /// Tools to install into the environment, in order
    #[serde(default)]
    pub tools: Vec<String>,

    /// Free-form data handed to the environment
    #[serde(default)]
    pub data: BTreeMap<String, String>,

    /// Task the agent inside the environment should carry out
    pub requirement: String,

    #[serde(default = "default_ttl", skip_serializing_if = "Option::is_none")]
    pub ttl_seconds: Option<u64>,
}

impl DeploymentRequest {
    pub fn new(environment_type: impl Into<String>, requirement: impl Into<String>) -> Self {
        Self {
            environment_type: environment_type.into(),
            tools: Vec::new(),
            data: BTreeMap::new(),
            requirement: requirement.into(),
            ttl_seconds: default_ttl(),
        }
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn with_ttl_seconds(mut self, ttl_seconds: u64) -> Self {
        self.ttl_seconds = Some(ttl_seconds);
        self
    }
}

/// Deployment status as reported by the Overseer.
///
/// Unknown values are kept verbatim in `Other` so that a newer control plane
/// never breaks response decoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeploymentStatus {
    Pending,
    Creating,
    Provisioning,
    Running,
    Ready,
    Failed,
    Terminating,
    Terminated,
    Other(String),
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &str {
        match self {
            DeploymentStatus::Pending => "pending",
            DeploymentStatus::Creating => "creating",
            DeploymentStatus::Provisioning => "provisioning",
            DeploymentStatus::Running => "running",
            DeploymentStatus::Ready => "ready",
            DeploymentStatus::Failed => "failed",
            DeploymentStatus::Terminating => "terminating",
            DeploymentStatus::Terminated => "terminated",
            DeploymentStatus::Other(other) => other,
        }
    }

    /// The environment accepts connections
    pub fn is_ready(&self) -> bool {
        matches!(self, DeploymentStatus::Ready | DeploymentStatus::Running)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, DeploymentStatus::Failed)
    }
}

impl From<&str> for DeploymentStatus {
    fn from(s: &str) -> Self {
        match s {
            "pending" => DeploymentStatus::Pending,
            "creating" => DeploymentStatus::Creating,
            "provisioning" => DeploymentStatus::Provisioning,
            "running" => DeploymentStatus::Running,
            "ready" => DeploymentStatus::Ready,
            "failed" => DeploymentStatus::Failed,
            "terminating" => DeploymentStatus::Terminating,
            "terminated" => DeploymentStatus::Terminated,
            other => DeploymentStatus::Other(other.to_string()),
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for DeploymentStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for DeploymentStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(DeploymentStatus::from(s.as_str()))
    }
}

/// Connection details attached to a deployment.
///
/// The Overseer sends a flat string map; only the keys below are recognized
/// and anything else is dropped during decoding. `vncUrl` and `viewUrl` are
/// accepted as fallbacks; when both spellings are sent the snake_case one wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawConnectionDetails")]
pub struct ConnectionDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,

    /// "http" or "https"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vnc_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_url: Option<String>,

    /// In-cluster URL of the deployment's service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress_host: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub novnc_port: Option<String>,
}

#[derive(Deserialize)]
struct RawConnectionDetails {
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    port: Option<String>,
    #[serde(default)]
    protocol: Option<String>,
    #[serde(default)]
    vnc_url: Option<String>,
    #[serde(default, rename = "vncUrl")]
    vnc_url_camel: Option<String>,
    #[serde(default)]
    view_url: Option<String>,
    #[serde(default, rename = "viewUrl")]
    view_url_camel: Option<String>,
    #[serde(default)]
    service_url: Option<String>,
    #[serde(default)]
    ingress_host: Option<String>,
    #[serde(default)]
    novnc_port: Option<String>,
}

impl From<RawConnectionDetails> for ConnectionDetails {
    fn from(raw: RawConnectionDetails) -> Self {
        Self {
            host: raw.host,
            port: raw.port,
            protocol: raw.protocol,
            vnc_url: raw.vnc_url.or(raw.vnc_url_camel),
            view_url: raw.view_url.or(raw.view_url_camel),
            service_url: raw.service_url,
            ingress_host: raw.ingress_host,
            novnc_port: raw.novnc_port,
        }
    }
}

impl ConnectionDetails {
    pub fn is_empty(&self) -> bool {
        self == &ConnectionDetails::default()
    }
}

/// Deployment returned by the Overseer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentResponse {
    pub id: String,
    pub status: DeploymentStatus,
    pub environment_type: String,

    /// Creation timestamp exactly as sent by the Overseer
    pub created_at: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_details: Option<ConnectionDetails>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Deployment status (`GET /deployments/{id}/status`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentStatusResponse {
    pub id: String,
    pub status: DeploymentStatus,
    #[serde(default)]
    pub message: Option<String>,
}

/// Deployment connection details (`GET /deployments/{id}/connect`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentConnectionResponse {
    pub id: String,
    pub connection_details: ConnectionDetails,
}

/// Error body produced by the Overseer on non-2xx responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: serde_json::Value,
}

/// Overseer health check (`GET /`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default)]
    pub version: Option<String>,
}
