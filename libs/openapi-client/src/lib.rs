//! Overseer deployment API models

pub mod models;
