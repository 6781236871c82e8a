//! `--diagnostic`: check the configuration and print a report

use std::time::Duration;

use colored::Colorize;

use crate::address::ServiceAddress;
use crate::bridge::session::derive_websocket_url;
use crate::config::settings::Settings;
use crate::http::client::OverseerClient;
use crate::utils::version_info;

const SAMPLE_ADDRESS: &str = "novnc.default.svc.cluster.local";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Ok,
    Warn,
    Fail,
}

#[derive(Debug, Clone)]
pub struct Check {
    pub name: &'static str,
    pub status: CheckStatus,
    pub detail: String,
}

impl Check {
    fn new(name: &'static str, status: CheckStatus, detail: impl Into<String>) -> Self {
        Self {
            name,
            status,
            detail: detail.into(),
        }
    }
}

/// Run every check against `settings`
pub async fn run_checks(settings: &Settings) -> Vec<Check> {
    let mut checks = Vec::new();

    match settings.page_origin() {
        Ok(origin) => {
            let sample = ServiceAddress::parse(SAMPLE_ADDRESS)
                .and_then(|address| derive_websocket_url(&origin, &address));
            match sample {
                Ok(url) => checks.push(Check::new("page origin", CheckStatus::Ok, url.to_string())),
                Err(e) => checks.push(Check::new("page origin", CheckStatus::Fail, e.to_string())),
            }
        }
        Err(e) => checks.push(Check::new("page origin", CheckStatus::Fail, e.to_string())),
    }

    let timeout = Duration::from_secs(settings.overseer.timeout_secs.min(5));
    match OverseerClient::new(settings.overseer.endpoint.as_deref(), timeout) {
        Ok(client) => match client.endpoint() {
            None => checks.push(Check::new(
                "overseer",
                CheckStatus::Warn,
                "endpoint not configured; deployments will fail",
            )),
            Some(endpoint) => {
                let endpoint = endpoint.to_string();
                match client.health().await {
                    Ok(health) => checks.push(Check::new(
                        "overseer",
                        CheckStatus::Ok,
                        format!(
                            "{} is {} (version {})",
                            endpoint,
                            health.status,
                            health.version.as_deref().unwrap_or("unknown")
                        ),
                    )),
                    Err(e) => checks.push(Check::new(
                        "overseer",
                        CheckStatus::Fail,
                        format!("{}: {}", endpoint, e),
                    )),
                }
            }
        },
        Err(e) => checks.push(Check::new("overseer", CheckStatus::Fail, e.to_string())),
    }

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    match tokio::net::TcpListener::bind(&addr).await {
        Ok(_) => checks.push(Check::new("listen address", CheckStatus::Ok, addr)),
        Err(e) => checks.push(Check::new(
            "listen address",
            CheckStatus::Fail,
            format!("{}: {}", addr, e),
        )),
    }

    checks.push(Check::new(
        "tunnel",
        CheckStatus::Ok,
        format!("/{{serviceAddress}}/websockify -> :{}", settings.tunnel.upstream_port),
    ));

    checks
}

/// Print the diagnostic report to stdout
pub async fn run_diagnostic(settings: &Settings) {
    let version = version_info();
    println!(
        "{} {} ({}, built {})",
        "a8s-gateway".bold(),
        version.version,
        version.git_hash,
        version.build_time
    );

    for check in run_checks(settings).await {
        let label = match check.status {
            CheckStatus::Ok => "  OK ".green().bold(),
            CheckStatus::Warn => " WARN".yellow().bold(),
            CheckStatus::Fail => " FAIL".red().bold(),
        };
        println!("{} {:<16} {}", label, check.name, check.detail);
    }
}
