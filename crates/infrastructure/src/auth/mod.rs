//! Remote authentication adapters.

mod http_gateway;

pub use http_gateway::HttpAuthGateway;
