//! Application configuration options

use std::time::Duration;

use url::Url;

use crate::bridge::session::BridgeOptions;
use crate::tunnel::proxy::TunnelOptions;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Overseer API base URL; deployments fail with a configuration error without it
    pub overseer_endpoint: Option<String>,

    /// Timeout of a single Overseer request
    pub overseer_timeout: Duration,

    /// Server configuration
    pub server: ServerOptions,

    /// Ingress tunnel options
    pub tunnel: TunnelOptions,

    /// Remote-desktop bridge options
    pub bridge: BridgeOptions,

    /// Maximum number of live sessions
    pub max_sessions: usize,
}

impl AppOptions {
    pub fn new(page_origin: Url) -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            overseer_endpoint: None,
            overseer_timeout: Duration::from_secs(30),
            server: ServerOptions::default(),
            tunnel: TunnelOptions::default(),
            bridge: BridgeOptions::new(page_origin),
            max_sessions: 64,
        }
    }
}

/// Lifecycle options for the gateway
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}
