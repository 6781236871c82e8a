//! RFB (VNC) client protocol
//!
//! Only what a headless viewer needs: the 3.3/3.7/3.8 handshake with the
//! `None` security type, a fixed 32-bit true-colour pixel format and the
//! Raw, CopyRect and DesktopSize encodings.

use std::fmt;

use tracing::debug;

use crate::bridge::transport::{FrameTransport, RfbStream};
use crate::errors::GatewayError;

pub const SECURITY_NONE: u8 = 1;

pub const ENCODING_RAW: i32 = 0;
pub const ENCODING_COPY_RECT: i32 = 1;
pub const ENCODING_DESKTOP_SIZE: i32 = -223;

/// Upper bound on desktop names and failure reasons read from the server
const MAX_STRING_LEN: u32 = 64 * 1024;

/// Upper bound on cut-text payloads
const MAX_CUT_TEXT_LEN: u32 = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProtocolVersion {
    V3_3,
    V3_7,
    V3_8,
}

impl ProtocolVersion {
    /// Parse the 12-byte `RFB xxx.yyy\n` banner and pick the version to speak
    pub fn negotiate(banner: &[u8]) -> Result<Self, GatewayError> {
        let (major, minor) = parse_banner(banner)?;
        match (major, minor) {
            (3, m) if m >= 8 => Ok(ProtocolVersion::V3_8),
            (3, 7) => Ok(ProtocolVersion::V3_7),
            (3, 3..=6) => Ok(ProtocolVersion::V3_3),
            (m, _) if m > 3 => Ok(ProtocolVersion::V3_8),
            _ => Err(GatewayError::ProtocolError(format!(
                "Unsupported RFB version {}.{}",
                major, minor
            ))),
        }
    }

    pub fn banner(&self) -> &'static [u8; 12] {
        match self {
            ProtocolVersion::V3_3 => b"RFB 003.003\n",
            ProtocolVersion::V3_7 => b"RFB 003.007\n",
            ProtocolVersion::V3_8 => b"RFB 003.008\n",
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProtocolVersion::V3_3 => "3.3",
            ProtocolVersion::V3_7 => "3.7",
            ProtocolVersion::V3_8 => "3.8",
        };
        f.write_str(s)
    }
}

fn parse_banner(banner: &[u8]) -> Result<(u32, u32), GatewayError> {
    let invalid = || {
        GatewayError::ProtocolError(format!(
            "Invalid RFB banner: {:?}",
            String::from_utf8_lossy(banner)
        ))
    };

    if banner.len() != 12 || &banner[..4] != b"RFB " || banner[7] != b'.' || banner[11] != b'\n'
    {
        return Err(invalid());
    }
    let digits = |bytes: &[u8]| -> Option<u32> {
        std::str::from_utf8(bytes)
            .ok()
            .filter(|s| s.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|s| s.parse().ok())
    };
    let major = digits(&banner[4..7]).ok_or_else(invalid)?;
    let minor = digits(&banner[8..11]).ok_or_else(invalid)?;
    Ok((major, minor))
}

/// Wire pixel format (16 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelFormat {
    pub bits_per_pixel: u8,
    pub depth: u8,
    pub big_endian: bool,
    pub true_colour: bool,
    pub red_max: u16,
    pub green_max: u16,
    pub blue_max: u16,
    pub red_shift: u8,
    pub green_shift: u8,
    pub blue_shift: u8,
}

impl PixelFormat {
    /// 32bpp little-endian `0x00RRGGBB`, the only format the viewport decodes
    pub fn rgbx8888() -> Self {
        Self {
            bits_per_pixel: 32,
            depth: 24,
            big_endian: false,
            true_colour: true,
            red_max: 255,
            green_max: 255,
            blue_max: 255,
            red_shift: 16,
            green_shift: 8,
            blue_shift: 0,
        }
    }

    pub fn bytes_per_pixel(&self) -> usize {
        (self.bits_per_pixel as usize).div_ceil(8)
    }

    pub fn encode(&self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[0] = self.bits_per_pixel;
        out[1] = self.depth;
        out[2] = self.big_endian as u8;
        out[3] = self.true_colour as u8;
        out[4..6].copy_from_slice(&self.red_max.to_be_bytes());
        out[6..8].copy_from_slice(&self.green_max.to_be_bytes());
        out[8..10].copy_from_slice(&self.blue_max.to_be_bytes());
        out[10] = self.red_shift;
        out[11] = self.green_shift;
        out[12] = self.blue_shift;
        out
    }

    pub fn decode(bytes: &[u8; 16]) -> Self {
        Self {
            bits_per_pixel: bytes[0],
            depth: bytes[1],
            big_endian: bytes[2] != 0,
            true_colour: bytes[3] != 0,
            red_max: u16::from_be_bytes([bytes[4], bytes[5]]),
            green_max: u16::from_be_bytes([bytes[6], bytes[7]]),
            blue_max: u16::from_be_bytes([bytes[8], bytes[9]]),
            red_shift: bytes[10],
            green_shift: bytes[11],
            blue_shift: bytes[12],
        }
    }
}

/// Result of the handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInit {
    pub version: ProtocolVersion,
    pub width: u16,
    pub height: u16,
    pub pixel_format: PixelFormat,
    pub name: String,
}

/// Run the client side of the RFB handshake up to and including ServerInit
pub async fn handshake<T: FrameTransport>(
    stream: &mut RfbStream<T>,
    shared: bool,
) -> Result<ServerInit, GatewayError> {
    let banner = stream.read_exact(12).await?;
    let version = ProtocolVersion::negotiate(&banner)?;
    stream.write(version.banner().to_vec()).await?;
    debug!(%version, "RFB version negotiated");

    match version {
        ProtocolVersion::V3_3 => {
            let security = stream.read_u32().await?;
            match security {
                0 => return Err(read_failure(stream, "Connection refused").await),
                1 => {}
                other => {
                    return Err(GatewayError::ProtocolError(format!(
                        "Unsupported security type {}",
                        other
                    )))
                }
            }
        }
        ProtocolVersion::V3_7 | ProtocolVersion::V3_8 => {
            let count = stream.read_u8().await?;
            if count == 0 {
                return Err(read_failure(stream, "Connection refused").await);
            }
            let types = stream.read_exact(count as usize).await?;
            if !types.contains(&SECURITY_NONE) {
                return Err(GatewayError::ProtocolError(format!(
                    "Server requires unsupported security types {:?}",
                    types
                )));
            }
            stream.write(vec![SECURITY_NONE]).await?;

            if version == ProtocolVersion::V3_8 {
                let result = stream.read_u32().await?;
                if result != 0 {
                    return Err(read_failure(stream, "Security handshake failed").await);
                }
            }
        }
    }

    stream.write(vec![shared as u8]).await?;

    let width = stream.read_u16().await?;
    let height = stream.read_u16().await?;
    let format_bytes = stream.read_exact(16).await?;
    let mut format = [0u8; 16];
    format.copy_from_slice(&format_bytes);
    let name = read_string(stream).await?;

    Ok(ServerInit {
        version,
        width,
        height,
        pixel_format: PixelFormat::decode(&format),
        name,
    })
}

async fn read_string<T: FrameTransport>(stream: &mut RfbStream<T>) -> Result<String, GatewayError> {
    let len = stream.read_u32().await?;
    if len > MAX_STRING_LEN {
        return Err(GatewayError::ProtocolError(format!(
            "String of {} bytes exceeds limit",
            len
        )));
    }
    let bytes = stream.read_exact(len as usize).await?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Read the server's failure reason, falling back to `context` if it cannot be read
async fn read_failure<T: FrameTransport>(stream: &mut RfbStream<T>, context: &str) -> GatewayError {
    match read_string(stream).await {
        Ok(reason) if !reason.is_empty() => {
            GatewayError::ProtocolError(format!("{}: {}", context, reason))
        }
        _ => GatewayError::ProtocolError(context.to_string()),
    }
}

// Client to server messages

pub fn set_pixel_format(format: &PixelFormat) -> Vec<u8> {
    let mut out = vec![0u8, 0, 0, 0];
    out.extend_from_slice(&format.encode());
    out
}

pub fn set_encodings(encodings: &[i32]) -> Vec<u8> {
    let mut out = vec![2u8, 0];
    out.extend_from_slice(&(encodings.len() as u16).to_be_bytes());
    for encoding in encodings {
        out.extend_from_slice(&encoding.to_be_bytes());
    }
    out
}

pub fn framebuffer_update_request(incremental: bool, width: u16, height: u16) -> Vec<u8> {
    let mut out = vec![3u8, incremental as u8, 0, 0, 0, 0];
    out.extend_from_slice(&width.to_be_bytes());
    out.extend_from_slice(&height.to_be_bytes());
    out
}

// Server to client messages

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rect {
    Raw {
        x: u16,
        y: u16,
        width: u16,
        height: u16,
        pixels: Vec<u8>,
    },
    CopyRect {
        x: u16,
        y: u16,
        width: u16,
        height: u16,
        src_x: u16,
        src_y: u16,
    },
    DesktopSize {
        width: u16,
        height: u16,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    FramebufferUpdate(Vec<Rect>),
    SetColourMapEntries,
    Bell,
    ServerCutText(String),
}

/// Read one server message. Pixel data is expected in `format`.
pub async fn read_server_message<T: FrameTransport>(
    stream: &mut RfbStream<T>,
    format: &PixelFormat,
) -> Result<ServerMessage, GatewayError> {
    let message_type = stream.read_u8().await?;
    match message_type {
        0 => {
            stream.skip(1).await?;
            let count = stream.read_u16().await?;
            let mut rects = Vec::with_capacity(count as usize);
            for _ in 0..count {
                rects.push(read_rect(stream, format).await?);
            }
            Ok(ServerMessage::FramebufferUpdate(rects))
        }
        1 => {
            stream.skip(3).await?;
            let colours = stream.read_u16().await?;
            stream.skip(colours as usize * 6).await?;
            Ok(ServerMessage::SetColourMapEntries)
        }
        2 => Ok(ServerMessage::Bell),
        3 => {
            stream.skip(3).await?;
            let len = stream.read_u32().await?;
            if len > MAX_CUT_TEXT_LEN {
                return Err(GatewayError::ProtocolError(format!(
                    "Cut text of {} bytes exceeds limit",
                    len
                )));
            }
            let bytes = stream.read_exact(len as usize).await?;
            // Latin-1
            Ok(ServerMessage::ServerCutText(
                bytes.iter().map(|b| *b as char).collect(),
            ))
        }
        other => Err(GatewayError::ProtocolError(format!(
            "Unknown server message type {}",
            other
        ))),
    }
}

async fn read_rect<T: FrameTransport>(
    stream: &mut RfbStream<T>,
    format: &PixelFormat,
) -> Result<Rect, GatewayError> {
    let x = stream.read_u16().await?;
    let y = stream.read_u16().await?;
    let width = stream.read_u16().await?;
    let height = stream.read_u16().await?;
    let encoding = stream.read_i32().await?;

    match encoding {
        ENCODING_RAW => {
            let len = width as usize * height as usize * format.bytes_per_pixel();
            let pixels = stream.read_exact(len).await?;
            Ok(Rect::Raw {
                x,
                y,
                width,
                height,
                pixels,
            })
        }
        ENCODING_COPY_RECT => {
            let src_x = stream.read_u16().await?;
            let src_y = stream.read_u16().await?;
            Ok(Rect::CopyRect {
                x,
                y,
                width,
                height,
                src_x,
                src_y,
            })
        }
        ENCODING_DESKTOP_SIZE => Ok(Rect::DesktopSize { width, height }),
        other => Err(GatewayError::ProtocolError(format!(
            "Server sent unrequested encoding {}",
            other
        ))),
    }
}
