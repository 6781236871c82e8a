//! Observable in-memory state

pub mod connection;
pub mod shared;
