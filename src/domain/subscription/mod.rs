//! Subscription domain module.
//!
//! Plan catalog, founder allocation, proration, quota and the subscription
//! state machine.
//!
//! # Module Structure
//!
//! - `account` - Account kinds, plan tiers, owner+kind key
//! - `plan_catalog` - Static price/quota table
//! - `status` - SubscriptionStatus state machine
//! - `aggregate` - Subscription aggregate entity
//! - `founder` - Founder discount allocation and pricing
//! - `proration` - Refund arithmetic
//! - `quota` - Per-period usage counter
//! - `cancellation` - Cancellation modes
//! - `events` - Domain events
//! - `errors` - SubscriptionError

mod account;
mod aggregate;
mod cancellation;
mod errors;
mod events;
mod founder;
mod plan_catalog;
pub mod proration;
mod quota;
mod status;

pub use account::{AccountKind, PlanTier, SubscriptionKey};
pub use aggregate::{RolloverOutcome, Subscription};
pub use cancellation::CancellationMode;
pub use errors::SubscriptionError;
pub use events::{ExpiredReason, SubscriptionChange, SubscriptionEvent};
pub use founder::{
    FounderAllocation, FounderGrant, FounderPricing, FounderSnapshot,
    DEFAULT_FOUNDER_DISCOUNT_PERCENT, DEFAULT_FOUNDER_LIMIT,
};
pub use plan_catalog::{PlanCatalog, PlanDefinition, UNLIMITED_QUOTA};
pub use proration::{compute_refund, quote_refund, RefundQuote};
pub use quota::QuotaUsage;
pub use status::SubscriptionStatus;
