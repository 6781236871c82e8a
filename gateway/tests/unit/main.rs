//! Integration tests for the a8s gateway

mod common;
mod test_bridge;
mod test_overseer;
mod test_server;
mod test_tunnel;
