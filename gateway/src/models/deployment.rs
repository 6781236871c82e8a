//! Deployment models

use chrono::{DateTime, NaiveDateTime, Utc};
use openapi_client::models::{ConnectionDetails, DeploymentResponse};
use url::Url;

use crate::address::ServiceAddress;
use crate::errors::GatewayError;

/// Connection detail field a service address was taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressSource {
    VncUrl,
    ViewUrl,
    ServiceUrl,
    Host,
}

impl AddressSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AddressSource::VncUrl => "vnc_url",
            AddressSource::ViewUrl => "view_url",
            AddressSource::ServiceUrl => "service_url",
            AddressSource::Host => "host",
        }
    }
}

/// Resolve the service address a deployment can be reached at.
///
/// Fields are consulted in a fixed order: `vnc_url`, `view_url`,
/// `service_url` (host component of the URL), then `host`. The first field
/// that is present decides the outcome; an invalid value is an error, never
/// a reason to try the next field.
pub fn resolve_service_address(
    details: &ConnectionDetails,
) -> Result<(ServiceAddress, AddressSource), GatewayError> {
    let url_fields = [
        (AddressSource::VncUrl, &details.vnc_url),
        (AddressSource::ViewUrl, &details.view_url),
        (AddressSource::ServiceUrl, &details.service_url),
    ];

    for (source, value) in url_fields {
        if let Some(value) = value {
            let host = url_host(value).ok_or_else(|| {
                GatewayError::ValidationError(format!(
                    "Connection detail '{}' is not a valid URL: {}",
                    source.as_str(),
                    value
                ))
            })?;
            return Ok((ServiceAddress::parse(&host)?, source));
        }
    }

    match &details.host {
        Some(host) => Ok((ServiceAddress::parse(host)?, AddressSource::Host)),
        None => Err(GatewayError::ValidationError(
            "Deployment has no connection address".to_string(),
        )),
    }
}

fn url_host(value: &str) -> Option<String> {
    let url = Url::parse(value).ok()?;
    match url.scheme() {
        "http" | "https" | "ws" | "wss" => url.host_str().map(str::to_string),
        _ => None,
    }
}

/// Service address of a deployment response
pub fn deployment_service_address(
    deployment: &DeploymentResponse,
) -> Result<ServiceAddress, GatewayError> {
    let details = deployment.connection_details.as_ref().ok_or_else(|| {
        GatewayError::ValidationError(format!(
            "Deployment {} has no connection details yet (status: {})",
            deployment.id, deployment.status
        ))
    })?;
    resolve_service_address(details).map(|(address, _)| address)
}

/// Parse a deployment timestamp.
///
/// Accepts RFC 3339 and naive ISO-8601 (taken as UTC, which is what the
/// Overseer emits).
pub fn parse_created_at(created_at: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(created_at) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(created_at, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
