//! Remote-desktop (VNC over WebSocket) bridge
//!
//! A [`session::BridgeSession`] owns one RFB client connection opened through
//! the tunnel; [`controller::run`] mounts and unmounts sessions as a
//! connection store changes.

pub mod controller;
pub mod rfb;
pub mod session;
pub mod transport;
pub mod viewport;
