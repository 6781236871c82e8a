//! Gateway API models

use serde::{Deserialize, Serialize};

/// Health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub sessions: usize,
}

/// Version response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionResponse {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Session response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    pub session_id: String,
}

/// Screen rectangle of the control that opened the connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: f64,
}

/// Snapshot of a session's remote-desktop connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionView {
    pub deployment_id: String,
    pub environment_type: String,
    pub service_address: String,
    pub is_visible: bool,
    /// "disconnected", "connecting" or "connected"
    pub status: String,
    pub bounding_box: BoundingBox,
    pub attempt: u64,
}

/// Open connection request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenConnectionRequest {
    pub service_address: String,
    pub environment_type: String,
    pub deployment_id: String,
    #[serde(default)]
    pub bounding_box: Option<BoundingBox>,
}

/// Remote-desktop bridge state of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeView {
    /// "idle", "validating", "loading", "ready" or "error"
    pub phase: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub framebuffer_width: u16,
    pub framebuffer_height: u16,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub scale: f64,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}
