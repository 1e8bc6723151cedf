//! Subscription handlers.
//!
//! ## Commands
//! - Selecting a plan (free immediately, paid pending payment)
//! - Cancelling in one of three modes
//! - Reactivating a scheduled cancellation
//! - Consuming quota
//! - Processing payment gateway webhooks
//! - Sweeping due period rollovers
//!
//! ## Queries
//! - Current subscription, pending selection and remaining quota
//!
//! Every handler that touches an owner's records holds that owner's lock and
//! settles any due rollover before acting.

mod cancel_subscription;
mod consume_quota;
mod create_or_change_plan;
mod get_subscription;
mod handle_payment_webhook;
mod reactivate_subscription;
mod rollover;
mod rollover_sweep;

// Commands
pub use cancel_subscription::{
    CancelSubscriptionCommand, CancelSubscriptionHandler, CancelSubscriptionResult,
};
pub use consume_quota::{ConsumeQuotaCommand, ConsumeQuotaHandler, ConsumeQuotaResult};
pub use create_or_change_plan::{
    CreateOrChangePlanCommand, CreateOrChangePlanHandler, CreateOrChangePlanResult,
};
pub use handle_payment_webhook::{
    HandlePaymentWebhookCommand, HandlePaymentWebhookHandler, HandlePaymentWebhookResult,
};
pub use reactivate_subscription::{
    ReactivateSubscriptionCommand, ReactivateSubscriptionHandler, ReactivateSubscriptionResult,
};
pub use rollover_sweep::{RolloverSweepCommand, RolloverSweepHandler, RolloverSweepResult};

// Queries
pub use get_subscription::{GetSubscriptionHandler, GetSubscriptionQuery, GetSubscriptionResult};

pub use rollover::{SettleOutcome, Settlement};
