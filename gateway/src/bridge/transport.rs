//! Byte transport under the RFB client

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, protocol::Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::errors::GatewayError;

/// Message-oriented byte channel.
///
/// websockify forwards the VNC byte stream in arbitrary chunks; a chunk
/// boundary carries no meaning.
#[async_trait]
pub trait FrameTransport: Send {
    /// Next chunk of bytes, or `None` once the peer has closed
    async fn recv(&mut self) -> Result<Option<Vec<u8>>, GatewayError>;

    async fn send(&mut self, data: Vec<u8>) -> Result<(), GatewayError>;

    /// Close the channel and wait for the peer to acknowledge
    async fn close(&mut self) -> Result<(), GatewayError>;
}

/// WebSocket client connection
pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsTransport {
    pub fn new(stream: WebSocketStream<MaybeTlsStream<TcpStream>>) -> Self {
        Self { stream }
    }
}

#[async_trait]
impl FrameTransport for WsTransport {
    async fn recv(&mut self) -> Result<Option<Vec<u8>>, GatewayError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Binary(data))) => return Ok(Some(data.to_vec())),
                Some(Ok(Message::Text(_))) => {
                    return Err(GatewayError::ProtocolError(
                        "Unexpected text frame on a binary VNC channel".to_string(),
                    ))
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                // Ping/Pong are answered by tungstenite
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    async fn send(&mut self, data: Vec<u8>) -> Result<(), GatewayError> {
        self.stream.send(Message::Binary(data.into())).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), GatewayError> {
        self.stream.close(None).await?;
        // Drain until the peer's close frame arrives
        while let Some(message) = self.stream.next().await {
            if message.is_err() {
                break;
            }
        }
        Ok(())
    }
}

/// Buffered reader/writer over a [`FrameTransport`]
pub struct RfbStream<T> {
    transport: T,
    buffer: Vec<u8>,
    pos: usize,
}

impl<T: FrameTransport> RfbStream<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            buffer: Vec::new(),
            pos: 0,
        }
    }

    fn available(&self) -> usize {
        self.buffer.len() - self.pos
    }

    async fn fill(&mut self, n: usize) -> Result<(), GatewayError> {
        while self.available() < n {
            let chunk = self
                .transport
                .recv()
                .await?
                .ok_or(GatewayError::WebSocketError(tungstenite::Error::ConnectionClosed))?;

            if self.pos > 0 {
                self.buffer.drain(..self.pos);
                self.pos = 0;
            }
            self.buffer.extend_from_slice(&chunk);
        }
        Ok(())
    }

    pub async fn read_exact(&mut self, n: usize) -> Result<Vec<u8>, GatewayError> {
        self.fill(n).await?;
        let bytes = self.buffer[self.pos..self.pos + n].to_vec();
        self.pos += n;
        Ok(bytes)
    }

    pub async fn skip(&mut self, n: usize) -> Result<(), GatewayError> {
        self.fill(n).await?;
        self.pos += n;
        Ok(())
    }

    pub async fn read_u8(&mut self) -> Result<u8, GatewayError> {
        self.fill(1).await?;
        let value = self.buffer[self.pos];
        self.pos += 1;
        Ok(value)
    }

    pub async fn read_u16(&mut self) -> Result<u16, GatewayError> {
        let bytes = self.read_exact(2).await?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub async fn read_u32(&mut self) -> Result<u32, GatewayError> {
        let bytes = self.read_exact(4).await?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub async fn read_i32(&mut self) -> Result<i32, GatewayError> {
        Ok(self.read_u32().await? as i32)
    }

    pub async fn write(&mut self, data: Vec<u8>) -> Result<(), GatewayError> {
        self.transport.send(data).await
    }

    pub async fn close(&mut self) -> Result<(), GatewayError> {
        self.transport.close().await
    }
}
