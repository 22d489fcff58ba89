//! BIM Portal Infrastructure - Adapters and configuration
//!
//! This crate provides concrete implementations of the ports
//! defined in the application layer, plus environment-based configuration.

pub mod adapters;
pub mod auth;
pub mod config;

pub use adapters::SystemClock;
pub use auth::HttpAuthGateway;
pub use config::BimPortalConfig;
