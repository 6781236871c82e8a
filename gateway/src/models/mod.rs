//! Domain models

pub mod connection;
pub mod deployment;
