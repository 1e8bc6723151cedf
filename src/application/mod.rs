//! Application layer - Commands, Queries, and Handlers.
//!
//! This layer orchestrates domain operations and coordinates between ports.
//! `SubscriptionEngine` bundles the handlers behind one caller-facing API.

mod engine;
pub mod handlers;
mod owner_locks;

pub use engine::{BootstrapError, EnginePorts, SubscriptionEngine};
pub use owner_locks::{OwnerGuard, OwnerLocks};
