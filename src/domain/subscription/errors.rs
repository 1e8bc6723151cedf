//! Subscription-specific error types.
//!
//! | Error | Meaning for the caller |
//! |-------|------------------------|
//! | InvalidState | Operation not allowed in the record's current status |
//! | UnknownTier | Tier does not exist for the account kind |
//! | PaymentFailed | Gateway declined the charge; record stays pending |
//! | RefundFailed | Refund not issued; nothing changed |
//! | NotFound | No matching subscription |
//! | AlreadySubscribed | Owner is already active on the requested tier |
//! | ReactivationWindowClosed | Period already ended |
//! | MissingPaymentReference | Refund impossible without a gateway reference |
//! | ConcurrentModification | Lost a race; safe to retry |
//! | InvalidWebhook | Signature or payload rejected |
//! | Infrastructure | Storage or transport failure |

use thiserror::Error;

use super::{AccountKind, PlanTier, SubscriptionStatus};
use crate::domain::foundation::{DomainError, ErrorCode, SubscriptionId, Timestamp, ValidationError};

/// Errors surfaced by subscription operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscriptionError {
    #[error("Cannot {attempted} a subscription in {current} state")]
    InvalidState { current: String, attempted: String },

    #[error("Tier {tier} does not exist for {account_kind} accounts")]
    UnknownTier {
        account_kind: AccountKind,
        tier: PlanTier,
    },

    #[error("Payment for subscription {subscription_id} failed: {reason}")]
    PaymentFailed {
        subscription_id: SubscriptionId,
        reason: String,
    },

    #[error("Refund for subscription {subscription_id} failed: {reason}")]
    RefundFailed {
        subscription_id: SubscriptionId,
        reason: String,
        retryable: bool,
    },

    #[error("Subscription not found: {0}")]
    NotFound(String),

    #[error("Already subscribed to {0}")]
    AlreadySubscribed(PlanTier),

    #[error("Reactivation window for subscription {subscription_id} closed at {period_end}")]
    ReactivationWindowClosed {
        subscription_id: SubscriptionId,
        period_end: Timestamp,
    },

    #[error("Subscription {0} has no payment reference to refund against")]
    MissingPaymentReference(SubscriptionId),

    #[error("Concurrent modification: {0}")]
    ConcurrentModification(String),

    #[error("Invalid webhook: {0}")]
    InvalidWebhook(String),

    #[error("Validation failed for '{field}': {message}")]
    Validation { field: String, message: String },

    #[error("Infrastructure error: {0}")]
    Infrastructure(String),
}

impl SubscriptionError {
    pub fn invalid_state(current: SubscriptionStatus, attempted: impl Into<String>) -> Self {
        SubscriptionError::InvalidState {
            current: current.to_string(),
            attempted: attempted.into(),
        }
    }

    pub fn unknown_tier(account_kind: AccountKind, tier: PlanTier) -> Self {
        SubscriptionError::UnknownTier { account_kind, tier }
    }

    pub fn payment_failed(subscription_id: SubscriptionId, reason: impl Into<String>) -> Self {
        SubscriptionError::PaymentFailed {
            subscription_id,
            reason: reason.into(),
        }
    }

    pub fn refund_failed(
        subscription_id: SubscriptionId,
        reason: impl Into<String>,
        retryable: bool,
    ) -> Self {
        SubscriptionError::RefundFailed {
            subscription_id,
            reason: reason.into(),
            retryable,
        }
    }

    pub fn not_found(what: impl ToString) -> Self {
        SubscriptionError::NotFound(what.to_string())
    }

    pub fn concurrent_modification(message: impl Into<String>) -> Self {
        SubscriptionError::ConcurrentModification(message.into())
    }

    pub fn invalid_webhook(message: impl Into<String>) -> Self {
        SubscriptionError::InvalidWebhook(message.into())
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        SubscriptionError::Infrastructure(message.into())
    }

    /// Returns the error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            SubscriptionError::InvalidState { .. } => ErrorCode::InvalidStateTransition,
            SubscriptionError::UnknownTier { .. } => ErrorCode::UnknownTier,
            SubscriptionError::PaymentFailed { .. } => ErrorCode::PaymentFailed,
            SubscriptionError::RefundFailed { .. } => ErrorCode::RefundFailed,
            SubscriptionError::NotFound(_) => ErrorCode::SubscriptionNotFound,
            SubscriptionError::AlreadySubscribed(_) => ErrorCode::AlreadySubscribed,
            SubscriptionError::ReactivationWindowClosed { .. } => {
                ErrorCode::ReactivationWindowClosed
            }
            SubscriptionError::MissingPaymentReference(_) => ErrorCode::MissingPaymentReference,
            SubscriptionError::ConcurrentModification(_) => ErrorCode::ConcurrentModification,
            SubscriptionError::InvalidWebhook(_) => ErrorCode::InvalidWebhook,
            SubscriptionError::Validation { .. } => ErrorCode::ValidationFailed,
            SubscriptionError::Infrastructure(_) => ErrorCode::DatabaseError,
        }
    }

    /// Returns true if repeating the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SubscriptionError::ConcurrentModification(_) | SubscriptionError::Infrastructure(_) => {
                true
            }
            SubscriptionError::RefundFailed { retryable, .. } => *retryable,
            _ => false,
        }
    }
}

impl From<ValidationError> for SubscriptionError {
    fn from(err: ValidationError) -> Self {
        let field = match &err {
            ValidationError::EmptyField { field }
            | ValidationError::OutOfRange { field, .. }
            | ValidationError::InvalidFormat { field, .. } => field.clone(),
        };
        SubscriptionError::Validation {
            field,
            message: err.to_string(),
        }
    }
}

impl From<DomainError> for SubscriptionError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::SubscriptionNotFound => SubscriptionError::NotFound(err.message),
            // A uniqueness violation means another request committed first.
            ErrorCode::ConcurrentModification | ErrorCode::SubscriptionExists => {
                SubscriptionError::ConcurrentModification(err.message)
            }
            ErrorCode::InvalidWebhook => SubscriptionError::InvalidWebhook(err.message),
            ErrorCode::ValidationFailed
            | ErrorCode::EmptyField
            | ErrorCode::OutOfRange
            | ErrorCode::InvalidFormat => SubscriptionError::Validation {
                field: err.detail("field").unwrap_or("unknown").to_string(),
                message: err.message,
            },
            _ => SubscriptionError::Infrastructure(err.to_string()),
        }
    }
}

impl From<SubscriptionError> for DomainError {
    fn from(err: SubscriptionError) -> Self {
        DomainError::new(err.code(), err.to_string())
    }
}
