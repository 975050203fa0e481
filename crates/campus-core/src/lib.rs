//! Ambient helpers shared by Campus services: env configuration, tracing
//! setup and serde helpers.

pub mod config;
pub mod serde;
pub mod tracing;
