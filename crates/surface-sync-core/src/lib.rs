//! Core types, wire protocol, config, and errors for Surface Sync.

pub mod config;
pub mod error;
pub mod protocol;
pub mod types;
