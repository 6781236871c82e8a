//! Tunnel routing tests

use std::time::Duration;

use a8s_gateway::bridge::session::{BridgeOptions, BridgePhase, BridgeSession};
use a8s_gateway::tunnel::proxy::TunnelOptions;
use axum::http::{Method, StatusCode};
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::{self, client::IntoClientRequest, Message};

use crate::common::{
    eventually, serve_router, FakeVncServer, ADDRESS, DESKTOP_HEIGHT, DESKTOP_WIDTH,
};
use crate::test_server::{app, call, gateway};

fn local_app() -> axum::Router {
    app(url::Url::parse("http://localhost:8080").unwrap())
}

#[tokio::test]
async fn test_invalid_service_address_is_not_found() {
    let app = local_app();
    for path in [
        "/novnc/websockify",
        "/NoVNC.default.svc.cluster.local/websockify",
        "/a/b.default.svc.cluster.local/websockify",
    ] {
        let (status, body) = call(&app, Method::GET, path, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{}", path);
        assert_eq!(body["error"], "not_found");
    }
}

#[tokio::test]
async fn test_unknown_route_is_json_not_found() {
    let (status, body) = call(&local_app(), Method::GET, "/nowhere", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_plain_request_is_rejected() {
    let path = format!("/{}/websockify", ADDRESS);
    let (status, _) = call(&local_app(), Method::GET, &path, None).await;
    assert!(status.is_client_error());
    assert_ne!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unreachable_upstream_fails_before_upgrade() {
    let addr = serve_router(local_app()).await;
    let url = format!("ws://{}/{}/websockify", addr, ADDRESS);
    let mut request = url.into_client_request().unwrap();
    request
        .headers_mut()
        .insert("sec-websocket-protocol", "binary".parse().unwrap());

    let result = tokio::time::timeout(
        Duration::from_secs(15),
        tokio_tungstenite::connect_async(request),
    )
    .await
    .unwrap();
    match result {
        Err(tungstenite::Error::Http(response)) => {
            let status = response.status().as_u16();
            assert!(status == 502 || status == 504, "status {}", status);
        }
        Ok((mut ws, _)) => {
            let _ = ws.close(None).await;
            panic!("upgrade should not succeed without an upstream");
        }
        Err(e) => panic!("unexpected error {}", e),
    }
}

fn tunnel_to(server: &FakeVncServer) -> TunnelOptions {
    TunnelOptions {
        upstream_port: server.addr.port(),
        upstream_host: Some("127.0.0.1".to_string()),
        connect_timeout: Duration::from_secs(5),
    }
}

#[tokio::test]
async fn test_bridge_reaches_ready_through_the_tunnel() {
    let upstream = FakeVncServer::start().await;
    let addr = serve_router(gateway(
        url::Url::parse("http://localhost:8080").unwrap(),
        None,
        tunnel_to(&upstream),
    ))
    .await;

    let origin = url::Url::parse(&format!("http://{}", addr)).unwrap();
    let session = BridgeSession::mount(&BridgeOptions::new(origin), ADDRESS);
    let mut phases = session.subscribe();
    tokio::time::timeout(
        Duration::from_secs(5),
        phases.wait_for(|phase| *phase == BridgePhase::Ready),
    )
    .await
    .unwrap()
    .unwrap();

    {
        let viewport = session.viewport();
        let viewport = viewport.read().unwrap();
        assert_eq!(viewport.framebuffer_size(), (DESKTOP_WIDTH, DESKTOP_HEIGHT));
        assert_eq!(viewport.pixel(1, 1), Some(0x0011_2233));
    }

    // Rewritten path, subprotocol carried upstream
    assert_eq!(
        upstream.events().first().map(String::as_str),
        Some("open /websockify binary")
    );

    session.unmount().await;
    assert!(eventually(|| upstream.events().contains(&"closed".to_string())).await);
}

#[tokio::test]
async fn test_tunnel_echoes_protocol_and_forwards_frames() {
    let upstream = FakeVncServer::start().await;
    let addr = serve_router(gateway(
        url::Url::parse("http://localhost:8080").unwrap(),
        None,
        tunnel_to(&upstream),
    ))
    .await;

    let mut request = format!("ws://{}/{}/websockify?token=abc", addr, ADDRESS)
        .into_client_request()
        .unwrap();
    request
        .headers_mut()
        .insert("sec-websocket-protocol", "binary".parse().unwrap());
    let (mut ws, response) = tokio_tungstenite::connect_async(request).await.unwrap();
    assert_eq!(
        response
            .headers()
            .get("sec-websocket-protocol")
            .and_then(|v| v.to_str().ok()),
        Some("binary")
    );

    // Upstream speaks first: the RFB banner arrives as a binary frame
    let banner = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(banner, Message::Binary(b"RFB 003.008\n".to_vec().into()));

    // Client bytes reach the upstream, which answers with its security types
    ws.send(Message::Binary(b"RFB 003.008\n".to_vec().into()))
        .await
        .unwrap();
    let security = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(security, Message::Binary(vec![1u8, 1].into()));

    ws.close(None).await.unwrap();
    assert!(eventually(|| upstream.events().contains(&"closed".to_string())).await);
}

#[tokio::test]
async fn test_tunnel_without_protocol_header() {
    let upstream = FakeVncServer::start().await;
    let addr = serve_router(gateway(
        url::Url::parse("http://localhost:8080").unwrap(),
        None,
        tunnel_to(&upstream),
    ))
    .await;

    let url = format!("ws://{}/{}/websockify", addr, ADDRESS);
    let (mut ws, response) = tokio_tungstenite::connect_async(url).await.unwrap();
    assert!(response.headers().get("sec-websocket-protocol").is_none());
    assert!(eventually(|| upstream.events().iter().any(|e| e == "open /websockify ")).await);
    ws.close(None).await.unwrap();
}
