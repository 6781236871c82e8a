//! WebSocket tunnel from the page origin to in-cluster websockify services

pub mod proxy;
pub mod rule;
