//! a8s gateway API models

pub mod models;
