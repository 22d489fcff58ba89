//! Authentication module for the BIM Portal client.
//!
//! This module provides:
//! - In-memory token storage with expiry tracking
//! - The authentication service that hands out valid tokens, refreshing
//!   or logging in as needed

mod service;
mod token_store;

pub use service::AuthService;
pub use token_store::{
    DEFAULT_REFRESH_MARGIN_SECONDS, MAX_REFRESH_MARGIN_SECONDS, TokenState, TokenStatus, TokenStore,
};
