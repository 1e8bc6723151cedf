//! Adapters - Implementations of port interfaces.
//!
//! - `events` - In-memory event bus
//! - `memory` - In-memory repositories and founder allocator
//! - `payment` - HTTP and mock payment gateways
//! - `postgres` - PostgreSQL persistence

pub mod events;
pub mod memory;
pub mod payment;
pub mod postgres;

pub use events::InMemoryEventBus;
pub use memory::{InMemoryFounderAllocator, InMemorySubscriptionRepository, InMemoryWebhookEventRepository};
pub use payment::{HttpGatewayConfig, HttpPaymentGateway, MockPaymentGateway};
pub use postgres::{PostgresFounderAllocator, PostgresSubscriptionRepository, PostgresWebhookEventRepository};
