//! HTTP server: consumer-facing JSON API and the ingress tunnel

pub mod handlers;
pub mod serve;
pub mod state;
