//! WebSocket forwarding for the ingress rewrite rule

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use axum::extract::ws::{
    rejection::WebSocketUpgradeRejection, CloseFrame as ClientCloseFrame,
    Message as ClientMessage, WebSocket, WebSocketUpgrade,
};
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use http::header::SEC_WEBSOCKET_PROTOCOL;
use http::{HeaderMap, Uri};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::{
    frame::coding::CloseCode, CloseFrame as UpstreamCloseFrame, Message as UpstreamMessage,
};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::errors::GatewayError;
use crate::tunnel::rule::{Rewrite, RewriteRule};

type UpstreamStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
pub struct TunnelOptions {
    pub upstream_port: u16,
    /// See [`RewriteRule::upstream_host`]
    pub upstream_host: Option<String>,
    pub connect_timeout: Duration,
}

impl Default for TunnelOptions {
    fn default() -> Self {
        Self {
            upstream_port: crate::tunnel::rule::DEFAULT_UPSTREAM_PORT,
            upstream_host: None,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// The ingress proxy: one rewrite rule plus upstream connection settings
#[derive(Debug, Clone)]
pub struct Tunnel {
    rule: RewriteRule,
    connect_timeout: Duration,
}

impl Tunnel {
    pub fn new(options: &TunnelOptions) -> Self {
        let rule = RewriteRule::new(options.upstream_port);
        let rule = match &options.upstream_host {
            Some(host) => rule.with_upstream_host(host.clone()),
            None => rule,
        };
        Self {
            rule,
            connect_timeout: options.connect_timeout,
        }
    }

    pub fn rule(&self) -> &RewriteRule {
        &self.rule
    }

    /// Proxy one upgrade request.
    ///
    /// Paths outside the rewrite rule are 404 whether or not they ask for an
    /// upgrade. The upstream socket is opened before the client is upgraded
    /// so that connection failures are reported as plain HTTP errors.
    pub async fn forward(
        &self,
        uri: &Uri,
        headers: &HeaderMap,
        ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    ) -> Response {
        let Some(rewrite) = self.rule.rewrite(uri.path()) else {
            return GatewayError::NotFound(format!("No route for {}", uri.path())).into_response();
        };
        let ws = match ws {
            Ok(ws) => ws,
            Err(rejection) => return rejection.into_response(),
        };

        let (upstream, protocol) = match self.connect(&rewrite, uri.query(), headers).await {
            Ok(connected) => connected,
            Err(e) => {
                warn!(address = %rewrite.service_address, "Tunnel upstream unavailable: {}", e);
                return e.into_response();
            }
        };

        let ws = match protocol {
            Some(protocol) => ws.protocols([protocol]),
            None => ws,
        };

        let address = rewrite.service_address.to_string();
        ws.on_upgrade(move |client| pump(client, upstream, address))
    }

    async fn connect(
        &self,
        rewrite: &Rewrite,
        query: Option<&str>,
        headers: &HeaderMap,
    ) -> Result<(UpstreamStream, Option<String>), GatewayError> {
        let url = rewrite.websocket_url(query);
        let mut request = url.as_str().into_client_request()?;
        if let Some(protocols) = headers.get(SEC_WEBSOCKET_PROTOCOL) {
            request
                .headers_mut()
                .insert(SEC_WEBSOCKET_PROTOCOL, protocols.clone());
        }

        debug!(%url, "Connecting tunnel upstream");
        let (stream, response) =
            tokio::time::timeout(self.connect_timeout, tokio_tungstenite::connect_async(request))
                .await
                .map_err(|_| GatewayError::Timeout(format!("Connecting to {}", url)))??;

        let protocol = response
            .headers()
            .get(SEC_WEBSOCKET_PROTOCOL)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        Ok((stream, protocol))
    }
}

fn to_upstream(message: ClientMessage) -> Option<UpstreamMessage> {
    match message {
        ClientMessage::Text(text) => Some(UpstreamMessage::Text(text.as_str().into())),
        ClientMessage::Binary(data) => Some(UpstreamMessage::Binary(data)),
        ClientMessage::Close(frame) => Some(UpstreamMessage::Close(frame.map(|frame| {
            UpstreamCloseFrame {
                code: CloseCode::from(frame.code),
                reason: frame.reason.as_str().into(),
            }
        }))),
        // Answered locally on each leg
        ClientMessage::Ping(_) | ClientMessage::Pong(_) => None,
    }
}

fn to_client(message: UpstreamMessage) -> Option<ClientMessage> {
    match message {
        UpstreamMessage::Text(text) => Some(ClientMessage::Text(text.as_str().into())),
        UpstreamMessage::Binary(data) => Some(ClientMessage::Binary(data)),
        UpstreamMessage::Close(frame) => Some(ClientMessage::Close(frame.map(|frame| {
            ClientCloseFrame {
                code: u16::from(frame.code),
                reason: frame.reason.as_str().into(),
            }
        }))),
        UpstreamMessage::Ping(_) | UpstreamMessage::Pong(_) | UpstreamMessage::Frame(_) => None,
    }
}

fn message_len(message: &UpstreamMessage) -> u64 {
    message.len() as u64
}

/// Forward frames both ways until either side closes
async fn pump(client: WebSocket, upstream: UpstreamStream, address: String) {
    info!(%address, "Tunnel opened");

    let (mut client_tx, mut client_rx) = client.split();
    let (mut upstream_tx, mut upstream_rx) = upstream.split();
    let sent = AtomicU64::new(0);
    let received = AtomicU64::new(0);

    let client_to_upstream = async {
        while let Some(Ok(message)) = client_rx.next().await {
            let Some(message) = to_upstream(message) else {
                continue;
            };
            let closing = message.is_close();
            sent.fetch_add(message_len(&message), Ordering::Relaxed);
            if upstream_tx.send(message).await.is_err() || closing {
                break;
            }
        }
        let _ = upstream_tx.close().await;
    };

    let upstream_to_client = async {
        while let Some(Ok(message)) = upstream_rx.next().await {
            received.fetch_add(message_len(&message), Ordering::Relaxed);
            let Some(message) = to_client(message) else {
                continue;
            };
            let closing = matches!(message, ClientMessage::Close(_));
            if client_tx.send(message).await.is_err() || closing {
                break;
            }
        }
        let _ = client_tx.close().await;
    };

    tokio::select! {
        _ = client_to_upstream => debug!(%address, "Client side closed"),
        _ = upstream_to_client => debug!(%address, "Upstream side closed"),
    }

    info!(
        %address,
        bytes_sent = sent.load(Ordering::Relaxed),
        bytes_received = received.load(Ordering::Relaxed),
        "Tunnel closed"
    );
}
