//! Domain layer containing business logic and domain types.
//!
//! - `foundation` - Shared primitives (ids, money, timestamps, errors, events)
//! - `subscription` - Subscription aggregate, plan catalog, founder pricing, proration

pub mod foundation;
pub mod subscription;
