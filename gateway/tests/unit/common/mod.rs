//! Shared test fixtures: a fake websockify VNC server and a mock Overseer

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use a8s_gateway::bridge::rfb::PixelFormat;
use axum::Router;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

pub const ADDRESS: &str = "novnc.default.svc.cluster.local";

/// Pixel sent in every framebuffer update, little-endian RGBX
pub const PIXEL: [u8; 4] = [0x33, 0x22, 0x11, 0x00];

pub const DESKTOP_WIDTH: u16 = 4;
pub const DESKTOP_HEIGHT: u16 = 2;

/// Wait up to five seconds for a condition
pub async fn eventually<F: Fn() -> bool>(condition: F) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}

/// Serve `router` on an ephemeral local port
pub async fn serve_router(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// Fake websockify endpoint speaking RFB 3.8 with no authentication
pub struct FakeVncServer {
    pub addr: SocketAddr,
    events: Arc<Mutex<Vec<String>>>,
}

impl FakeVncServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let events = Arc::new(Mutex::new(Vec::new()));

        let log = events.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(handle_connection(stream, log.clone()));
            }
        });

        Self { addr, events }
    }

    pub fn origin(&self) -> url::Url {
        url::Url::parse(&format!("http://{}", self.addr)).unwrap()
    }

    /// Everything the server has seen so far, in order
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

async fn handle_connection(stream: TcpStream, events: Arc<Mutex<Vec<String>>>) {
    let log = events.clone();
    let callback = move |request: &Request, mut response: Response| -> Result<Response, ErrorResponse> {
        let protocol = request
            .headers()
            .get("sec-websocket-protocol")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        log.lock()
            .unwrap()
            .push(format!("open {} {}", request.uri().path(), protocol));
        if protocol == "binary" {
            response
                .headers_mut()
                .insert("sec-websocket-protocol", HeaderValue::from_static("binary"));
        }
        Ok(response)
    };

    let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
        return;
    };
    let mut session = ServerSide {
        ws: &mut ws,
        buffer: Vec::new(),
        events: &events,
    };
    if session.handshake().await.is_none() {
        return;
    }
    events.lock().unwrap().push("ready".to_string());

    // Keep reading update requests until the client goes away
    while let Some(message) = ws.next().await {
        match message {
            Ok(Message::Close(_)) => {
                events.lock().unwrap().push("closed".to_string());
            }
            Ok(_) => {}
            Err(_) => break,
        }
    }
}

struct ServerSide<'a> {
    ws: &'a mut WebSocketStream<TcpStream>,
    buffer: Vec<u8>,
    events: &'a Mutex<Vec<String>>,
}

impl ServerSide<'_> {
    async fn send(&mut self, data: Vec<u8>) -> Option<()> {
        self.ws.send(Message::Binary(data.into())).await.ok()
    }

    async fn read(&mut self, n: usize) -> Option<Vec<u8>> {
        while self.buffer.len() < n {
            match self.ws.next().await? {
                Ok(Message::Binary(data)) => self.buffer.extend_from_slice(&data),
                Ok(Message::Close(_)) => {
                    self.events.lock().unwrap().push("closed".to_string());
                    return None;
                }
                Err(_) => return None,
                Ok(_) => {}
            }
        }
        Some(self.buffer.drain(..n).collect())
    }

    async fn handshake(&mut self) -> Option<()> {
        self.send(b"RFB 003.008\n".to_vec()).await?;
        self.read(12).await?;
        self.send(vec![1, 1]).await?;
        self.read(1).await?;
        self.send(vec![0, 0, 0, 0]).await?;
        // ClientInit
        self.read(1).await?;

        let name = b"fake";
        let mut init = Vec::new();
        init.extend_from_slice(&DESKTOP_WIDTH.to_be_bytes());
        init.extend_from_slice(&DESKTOP_HEIGHT.to_be_bytes());
        init.extend_from_slice(&PixelFormat::rgbx8888().encode());
        init.extend_from_slice(&(name.len() as u32).to_be_bytes());
        init.extend_from_slice(name);
        self.send(init).await?;

        // SetPixelFormat, SetEncodings with three encodings, FramebufferUpdateRequest
        self.read(20).await?;
        self.read(16).await?;
        self.read(10).await?;

        let mut update = vec![0u8, 0];
        update.extend_from_slice(&1u16.to_be_bytes());
        update.extend_from_slice(&0u16.to_be_bytes());
        update.extend_from_slice(&0u16.to_be_bytes());
        update.extend_from_slice(&DESKTOP_WIDTH.to_be_bytes());
        update.extend_from_slice(&DESKTOP_HEIGHT.to_be_bytes());
        update.extend_from_slice(&0i32.to_be_bytes());
        for _ in 0..(DESKTOP_WIDTH as usize * DESKTOP_HEIGHT as usize) {
            update.extend_from_slice(&PIXEL);
        }
        self.send(update).await
    }
}
