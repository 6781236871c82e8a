//! Gateway settings
//!
//! Loaded from a JSON file, then overridden by environment variables and
//! `--key=value` command line flags, in that order.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::app::options::{AppOptions, LifecycleOptions, ServerOptions};
use crate::bridge::session::BridgeOptions;
use crate::errors::GatewayError;
use crate::filesys::file::File;
use crate::http::client::OVERSEER_ENDPOINT_ENV;
use crate::logs::{LogLevel, LogOptions};
use crate::tunnel::proxy::TunnelOptions;
use crate::tunnel::rule::DEFAULT_UPSTREAM_PORT;

/// Settings file read when `--config` is not given
pub const DEFAULT_SETTINGS_PATH: &str = "/etc/a8s/gateway.json";

/// Origin of the page embedding the remote desktop
pub const PAGE_ORIGIN_ENV: &str = "A8S_PAGE_ORIGIN";

/// Gateway settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log output configuration
    #[serde(default)]
    pub logging: LoggingSettings,

    /// HTTP listener
    #[serde(default)]
    pub server: ServerSettings,

    /// Overseer control plane
    #[serde(default)]
    pub overseer: OverseerSettings,

    /// Origin the remote-desktop page is served from
    #[serde(default = "default_page_origin")]
    pub page_origin: String,

    /// Ingress tunnel
    #[serde(default)]
    pub tunnel: TunnelSettings,

    /// Remote-desktop bridge
    #[serde(default)]
    pub bridge: BridgeSettings,

    /// Maximum number of live sessions
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Maximum delay for graceful shutdown in seconds
    #[serde(default = "default_max_shutdown_delay")]
    pub max_shutdown_delay_secs: u64,
}

fn default_page_origin() -> String {
    "http://localhost:8080".to_string()
}

fn default_max_sessions() -> usize {
    64
}

fn default_max_shutdown_delay() -> u64 {
    30
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            logging: LoggingSettings::default(),
            server: ServerSettings::default(),
            overseer: OverseerSettings::default(),
            page_origin: default_page_origin(),
            tunnel: TunnelSettings::default(),
            bridge: BridgeSettings::default(),
            max_sessions: default_max_sessions(),
            max_shutdown_delay_secs: default_max_shutdown_delay(),
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// JSON lines on stdout
    #[serde(default)]
    pub json: bool,

    /// Directory for daily-rolling log files
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Overseer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverseerSettings {
    /// Base URL of the Overseer API
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_overseer_timeout")]
    pub timeout_secs: u64,
}

fn default_overseer_timeout() -> u64 {
    30
}

impl Default for OverseerSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: default_overseer_timeout(),
        }
    }
}

/// Ingress tunnel settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelSettings {
    /// websockify port on every target service
    #[serde(default = "default_upstream_port")]
    pub upstream_port: u16,

    /// Dial this host instead of the service address, for local development
    #[serde(default)]
    pub upstream_host: Option<String>,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_upstream_port() -> u16 {
    DEFAULT_UPSTREAM_PORT
}

fn default_connect_timeout() -> u64 {
    10
}

impl Default for TunnelSettings {
    fn default() -> Self {
        Self {
            upstream_port: default_upstream_port(),
            upstream_host: None,
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

/// Remote-desktop bridge settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeSettings {
    #[serde(default = "default_viewport_width")]
    pub viewport_width: u32,

    #[serde(default = "default_viewport_height")]
    pub viewport_height: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub handshake_timeout_secs: u64,

    #[serde(default = "default_close_timeout")]
    pub close_timeout_secs: u64,

    /// Let other viewers stay connected
    #[serde(default = "default_true")]
    pub shared: bool,
}

fn default_viewport_width() -> u32 {
    crate::bridge::viewport::DEFAULT_VIEWPORT_WIDTH
}

fn default_viewport_height() -> u32 {
    crate::bridge::viewport::DEFAULT_VIEWPORT_HEIGHT
}

fn default_close_timeout() -> u64 {
    2
}

fn default_true() -> bool {
    true
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            viewport_width: default_viewport_width(),
            viewport_height: default_viewport_height(),
            connect_timeout_secs: default_connect_timeout(),
            handshake_timeout_secs: default_connect_timeout(),
            close_timeout_secs: default_close_timeout(),
            shared: true,
        }
    }
}

impl Settings {
    /// Load settings from `path`, or from [`DEFAULT_SETTINGS_PATH`] if it exists.
    ///
    /// An explicit path that cannot be read is an error; a missing default
    /// file yields the built-in defaults.
    pub async fn load(path: Option<&Path>) -> Result<Self, GatewayError> {
        let file = match path {
            Some(path) => File::new(path),
            None => {
                let file = File::new(DEFAULT_SETTINGS_PATH);
                if !file.exists().await {
                    return Ok(Self::default());
                }
                file
            }
        };

        file.read_json::<Settings>().await.map_err(|e| {
            GatewayError::ConfigError(format!(
                "Unable to read settings file {}: {}",
                file.path().display(),
                e
            ))
        })
    }

    /// Apply `OVERSEER_API_ENDPOINT` and `A8S_PAGE_ORIGIN`
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(endpoint) = lookup(OVERSEER_ENDPOINT_ENV).filter(|v| !v.trim().is_empty()) {
            self.overseer.endpoint = Some(endpoint);
        }
        if let Some(origin) = lookup(PAGE_ORIGIN_ENV).filter(|v| !v.trim().is_empty()) {
            self.page_origin = origin;
        }
    }

    /// Apply `--host`, `--port`, `--overseer`, `--page-origin` and `--log-level`
    pub fn apply_cli(&mut self, args: &HashMap<String, String>) -> Result<(), GatewayError> {
        if let Some(host) = args.get("host") {
            self.server.host = host.clone();
        }
        if let Some(port) = args.get("port") {
            self.server.port = port
                .parse()
                .map_err(|_| GatewayError::ConfigError(format!("Invalid port: {}", port)))?;
        }
        if let Some(endpoint) = args.get("overseer") {
            self.overseer.endpoint = Some(endpoint.clone());
        }
        if let Some(origin) = args.get("page-origin") {
            self.page_origin = origin.clone();
        }
        if let Some(level) = args.get("log-level") {
            self.log_level = level.parse().map_err(GatewayError::ConfigError)?;
        }
        Ok(())
    }

    pub fn page_origin(&self) -> Result<Url, GatewayError> {
        Url::parse(&self.page_origin).map_err(|e| {
            GatewayError::ConfigError(format!("Invalid page origin '{}': {}", self.page_origin, e))
        })
    }

    pub fn log_options(&self) -> LogOptions {
        LogOptions {
            log_level: self.log_level.clone(),
            stdout: true,
            log_dir: self.logging.dir.clone(),
            json_format: self.logging.json,
        }
    }

    /// Runtime options for the gateway
    pub fn app_options(&self) -> Result<AppOptions, GatewayError> {
        let mut bridge = BridgeOptions::new(self.page_origin()?);
        bridge.viewport_width = self.bridge.viewport_width;
        bridge.viewport_height = self.bridge.viewport_height;
        bridge.connect_timeout = Duration::from_secs(self.bridge.connect_timeout_secs);
        bridge.handshake_timeout = Duration::from_secs(self.bridge.handshake_timeout_secs);
        bridge.close_timeout = Duration::from_secs(self.bridge.close_timeout_secs);
        bridge.shared = self.bridge.shared;

        Ok(AppOptions {
            lifecycle: LifecycleOptions {
                max_shutdown_delay: Duration::from_secs(self.max_shutdown_delay_secs),
            },
            overseer_endpoint: self.overseer.endpoint.clone(),
            overseer_timeout: Duration::from_secs(self.overseer.timeout_secs),
            server: ServerOptions {
                host: self.server.host.clone(),
                port: self.server.port,
            },
            tunnel: TunnelOptions {
                upstream_port: self.tunnel.upstream_port,
                upstream_host: self.tunnel.upstream_host.clone(),
                connect_timeout: Duration::from_secs(self.tunnel.connect_timeout_secs),
            },
            bridge,
            max_sessions: self.max_sessions,
        })
    }
}
