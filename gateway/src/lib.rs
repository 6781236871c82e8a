//! a8s gateway library
//!
//! Deployment client, per-session connection stores, the ingress WebSocket
//! tunnel and a headless VNC bridge for a8s remote desktops.

pub mod address;
pub mod app;
pub mod bridge;
pub mod config;
pub mod diagnostic;
pub mod errors;
pub mod filesys;
pub mod http;
pub mod logs;
pub mod models;
pub mod server;
pub mod store;
pub mod tunnel;
pub mod utils;
