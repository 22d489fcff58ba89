//! Port definitions (interfaces)
//!
//! Ports define the boundaries between the authentication core and external systems.
//! Each port is a trait that can be implemented by adapters in the infrastructure layer.

mod auth_gateway;
mod clock;

pub use auth_gateway::{AuthGateway, GatewayError};
pub use clock::Clock;
