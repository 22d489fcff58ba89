//! BIM Portal Domain - Core authentication types
//!
//! This crate defines the credential and token types shared by the
//! BIM Portal client and the codec that reads claims from bearer tokens.
//! All types here are pure Rust with no I/O dependencies.

pub mod auth;
pub mod error;

pub use auth::{
    Credentials, EXPIRATION_CLAIM, TokenClaims, TokenResponse, USER_ID_CLAIMS, bearer_header,
    token_preview,
};
pub use error::{TokenError, TokenResult};
