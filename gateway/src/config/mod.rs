//! Gateway configuration

pub mod settings;
