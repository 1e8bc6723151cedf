//! Payment gateway adapters.

mod http_gateway;
mod mock_gateway;
pub mod signature;

pub use http_gateway::{HttpGatewayConfig, HttpPaymentGateway, DEFAULT_BASE_URL};
pub use mock_gateway::MockPaymentGateway;
