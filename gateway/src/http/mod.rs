//! Overseer HTTP client

pub mod client;
pub mod deployments;
