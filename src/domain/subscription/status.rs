//! Subscription status state machine.

use crate::domain::foundation::{StateMachine, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a subscription record.
///
/// Records never return to `PendingPayment`; a new plan always means a new record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Paid plan selected, charge not yet confirmed. No benefits.
    PendingPayment,

    /// Fully in force.
    Active,

    /// End-of-period cancellation requested; benefits continue until period end.
    Cancelling,

    /// Ended. Terminal.
    Expired,
}

impl SubscriptionStatus {
    /// Returns true if this status carries plan benefits (quota, featured flag).
    pub fn has_benefits(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Active | SubscriptionStatus::Cancelling
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::PendingPayment => "pending_payment",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Cancelling => "cancelling",
            SubscriptionStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_payment" => Ok(SubscriptionStatus::PendingPayment),
            "active" => Ok(SubscriptionStatus::Active),
            "cancelling" => Ok(SubscriptionStatus::Cancelling),
            "expired" => Ok(SubscriptionStatus::Expired),
            other => Err(ValidationError::invalid_format(
                "status",
                format!("unknown subscription status '{}'", other),
            )),
        }
    }
}

impl StateMachine for SubscriptionStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use SubscriptionStatus::*;
        matches!(
            (self, target),
            // From PENDING_PAYMENT
            (PendingPayment, Active)
                | (PendingPayment, Expired)
            // From ACTIVE
                | (Active, Cancelling)
                | (Active, Expired)
                | (Active, Active) // Renewal
            // From CANCELLING
                | (Cancelling, Active) // Reactivation
                | (Cancelling, Expired)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use SubscriptionStatus::*;
        match self {
            PendingPayment => vec![Active, Expired],
            Active => vec![Cancelling, Expired, Active],
            Cancelling => vec![Active, Expired],
            Expired => vec![],
        }
    }
}
