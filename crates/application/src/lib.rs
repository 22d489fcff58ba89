//! BIM Portal Application - Token lifecycle and authentication orchestration
//!
//! This crate owns the cached token state and decides, for every request,
//! whether the cached token can be reused or must be refreshed or replaced
//! by a full login. Remote calls and time go through the ports in
//! [`ports`], implemented by the infrastructure crate.

pub mod auth;
pub mod error;
pub mod ports;

pub use auth::{
    AuthService, DEFAULT_REFRESH_MARGIN_SECONDS, MAX_REFRESH_MARGIN_SECONDS, TokenState,
    TokenStatus, TokenStore,
};
pub use error::{AuthError, AuthResult};
pub use ports::{AuthGateway, Clock, GatewayError};
