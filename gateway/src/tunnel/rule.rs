//! Ingress rewrite rule `/{serviceAddress}/websockify`

use url::Url;

use crate::address::ServiceAddress;

/// Port of the websockify process next to every remote desktop
pub const DEFAULT_UPSTREAM_PORT: u16 = 6080;

pub const WEBSOCKIFY_SUFFIX: &str = "/websockify";

/// Where a matching request is forwarded to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    pub service_address: ServiceAddress,
    pub destination: Url,
}

impl Rewrite {
    /// WebSocket form of the destination, carrying the client's query string
    pub fn websocket_url(&self, query: Option<&str>) -> Url {
        let mut url = self.destination.clone();
        // http -> ws is always a permitted scheme change
        let _ = url.set_scheme("ws");
        url.set_query(query);
        url
    }
}

#[derive(Debug, Clone)]
pub struct RewriteRule {
    pub upstream_port: u16,
    /// Dial this host for every matching path instead of the captured
    /// service address (e.g. a local `kubectl port-forward`). The capture is
    /// still validated.
    pub upstream_host: Option<String>,
}

impl Default for RewriteRule {
    fn default() -> Self {
        Self {
            upstream_port: DEFAULT_UPSTREAM_PORT,
            upstream_host: None,
        }
    }
}

impl RewriteRule {
    pub fn new(upstream_port: u16) -> Self {
        Self {
            upstream_port,
            upstream_host: None,
        }
    }

    pub fn with_upstream_host(mut self, host: impl Into<String>) -> Self {
        self.upstream_host = Some(host.into());
        self
    }

    /// Match a raw (not percent-decoded) request path.
    ///
    /// The capture has to be a valid service address, so it is always a
    /// single path segment and can only name an in-cluster service.
    pub fn rewrite(&self, path: &str) -> Option<Rewrite> {
        let capture = path
            .strip_prefix('/')?
            .strip_suffix(WEBSOCKIFY_SUFFIX)?;
        let service_address = ServiceAddress::parse(capture).ok()?;
        let host = self
            .upstream_host
            .as_deref()
            .unwrap_or(service_address.as_str());
        let destination = Url::parse(&format!(
            "http://{}:{}{}",
            host, self.upstream_port, WEBSOCKIFY_SUFFIX
        ))
        .ok()?;

        Some(Rewrite {
            service_address,
            destination,
        })
    }
}
