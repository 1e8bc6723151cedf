//! Foundation module - Shared domain primitives.
//!
//! Contains value objects, identifiers, errors and event infrastructure
//! that form the vocabulary of the subscription engine.

mod errors;
mod events;
mod ids;
mod money;
mod percentage;
mod state_machine;
mod timestamp;

pub use errors::{DomainError, ErrorCode, ValidationError};
pub use events::{DomainEvent, EventEnvelope, EventId, EventMetadata, SerializableDomainEvent};
pub use ids::{OwnerId, SubscriptionId};
pub use money::Money;
pub use percentage::Percentage;
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;
