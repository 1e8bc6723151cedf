//! Subscription domain events.
//!
//! Every committed transition produces one event. Events are named in past
//! tense and routed by `event_type`.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{AccountKind, PlanTier, Subscription, SubscriptionStatus};
use crate::domain::foundation::{
    DomainEvent, EventId, Money, OwnerId, SubscriptionId, Timestamp,
};

/// Why a subscription ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiredReason {
    /// End-of-period cancellation reached the period end.
    CancelledAtPeriodEnd,
    /// Period ended without a confirmed renewal payment.
    UnpaidRenewal,
    /// Cancelled with a prorated refund.
    RefundCancellation,
    /// Cancelled immediately without refund.
    ImmediateCancellation,
    /// Replaced by a newer plan selection.
    Superseded,
}

impl fmt::Display for ExpiredReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExpiredReason::CancelledAtPeriodEnd => "cancelled_at_period_end",
            ExpiredReason::UnpaidRenewal => "unpaid_renewal",
            ExpiredReason::RefundCancellation => "refund_cancellation",
            ExpiredReason::ImmediateCancellation => "immediate_cancellation",
            ExpiredReason::Superseded => "superseded",
        };
        f.write_str(s)
    }
}

/// What changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum SubscriptionChange {
    /// New record. Free plans are created `active`, paid plans `pending_payment`.
    Created {
        tier: PlanTier,
        status: SubscriptionStatus,
        price: Money,
        has_founder_discount: bool,
    },

    /// Pending record confirmed by the gateway.
    Activated {
        tier: PlanTier,
        payment_reference: String,
        period_start: Timestamp,
        period_end: Timestamp,
    },

    /// Period rolled forward.
    Renewed {
        period_start: Timestamp,
        period_end: Timestamp,
        periods: u32,
    },

    /// Gateway confirmed payment for the upcoming period.
    RenewalPaymentRecorded { payment_reference: String },

    /// End-of-period cancellation requested.
    CancellationScheduled { effective_at: Timestamp },

    /// Cancellation withdrawn before period end.
    Reactivated,

    Expired {
        reason: ExpiredReason,
        superseded_by: Option<SubscriptionId>,
    },

    RefundIssued {
        amount: Money,
        refund_id: String,
        remaining_days: i64,
        total_days: i64,
    },

    /// Gateway declined the initial charge; record stays pending.
    ChargeFailed { reason: String },
}

impl SubscriptionChange {
    fn event_type(&self) -> &'static str {
        match self {
            SubscriptionChange::Created { .. } => "subscription.created.v1",
            SubscriptionChange::Activated { .. } => "subscription.activated.v1",
            SubscriptionChange::Renewed { .. } => "subscription.renewed.v1",
            SubscriptionChange::RenewalPaymentRecorded { .. } => {
                "subscription.renewal_payment_recorded.v1"
            }
            SubscriptionChange::CancellationScheduled { .. } => {
                "subscription.cancellation_scheduled.v1"
            }
            SubscriptionChange::Reactivated => "subscription.reactivated.v1",
            SubscriptionChange::Expired { .. } => "subscription.expired.v1",
            SubscriptionChange::RefundIssued { .. } => "subscription.refund_issued.v1",
            SubscriptionChange::ChargeFailed { .. } => "subscription.charge_failed.v1",
        }
    }
}

/// Event emitted for one subscription record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionEvent {
    pub event_id: EventId,
    pub subscription_id: SubscriptionId,
    pub owner_id: OwnerId,
    pub account_kind: AccountKind,
    pub occurred_at: Timestamp,
    #[serde(flatten)]
    pub change: SubscriptionChange,
}

impl SubscriptionEvent {
    /// Builds an event for `subscription`.
    pub fn new(subscription: &Subscription, change: SubscriptionChange, occurred_at: Timestamp) -> Self {
        Self {
            event_id: EventId::new(),
            subscription_id: subscription.id,
            owner_id: subscription.owner_id.clone(),
            account_kind: subscription.account_kind,
            occurred_at,
            change,
        }
    }

    pub fn created(subscription: &Subscription) -> Self {
        Self::new(
            subscription,
            SubscriptionChange::Created {
                tier: subscription.tier,
                status: subscription.status,
                price: subscription.price,
                has_founder_discount: subscription.has_founder_discount,
            },
            subscription.created_at,
        )
    }

    pub fn expired(subscription: &Subscription, reason: ExpiredReason, at: Timestamp) -> Self {
        Self::new(
            subscription,
            SubscriptionChange::Expired {
                reason,
                superseded_by: subscription.superseded_by,
            },
            at,
        )
    }
}

impl DomainEvent for SubscriptionEvent {
    fn event_type(&self) -> &'static str {
        self.change.event_type()
    }

    fn aggregate_id(&self) -> String {
        self.subscription_id.to_string()
    }

    fn aggregate_type(&self) -> &'static str {
        "Subscription"
    }

    fn occurred_at(&self) -> Timestamp {
        self.occurred_at
    }

    fn event_id(&self) -> EventId {
        self.event_id.clone()
    }
}
