//! In-memory adapters for tests and single-process deployments.

mod founder_allocator;
mod subscription_repository;
mod webhook_event_repository;

pub use founder_allocator::InMemoryFounderAllocator;
pub use subscription_repository::InMemorySubscriptionRepository;
pub use webhook_event_repository::InMemoryWebhookEventRepository;
