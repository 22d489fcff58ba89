//! Authentication domain types

mod claims;
mod types;

pub use claims::{EXPIRATION_CLAIM, TokenClaims, USER_ID_CLAIMS};
pub use types::{Credentials, TokenResponse, bearer_header, token_preview};
