//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Persistence Ports
//!
//! - `SubscriptionRepository` - Subscription records with optimistic locking
//! - `FounderAllocator` - Capacity-bounded founder grants
//! - `WebhookEventRepository` - Gateway webhook idempotency tracking
//!
//! ## External Service Ports
//!
//! - `PaymentGateway` - Refunds and webhook verification
//! - `EventPublisher` - Domain event publishing
//! - `Clock` - Current time

mod clock;
mod event_publisher;
mod founder_allocator;
mod payment_gateway;
mod subscription_repository;
mod webhook_event_repository;

pub use clock::{Clock, FixedClock, SystemClock};
pub use event_publisher::EventPublisher;
pub use founder_allocator::FounderAllocator;
pub use payment_gateway::{
    PaymentError, PaymentErrorCode, PaymentEvent, PaymentEventKind, PaymentGateway, RefundReceipt,
    RefundRequest,
};
pub use subscription_repository::{SubscriptionRepository, SubscriptionWrite};
pub use webhook_event_repository::{
    SaveResult, WebhookDisposition, WebhookEventRecord, WebhookEventRepository,
};
