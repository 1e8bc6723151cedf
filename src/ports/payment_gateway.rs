//! Payment gateway port.
//!
//! The engine never moves money itself. It asks the gateway for refunds and
//! learns about charges through signed webhook events.
//!
//! # Design
//!
//! - **Gateway agnostic**: any processor that can refund a charge and sign webhooks
//! - **Idempotent**: refund requests carry a caller-derived idempotency key

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{DomainError, ErrorCode, Money, SubscriptionId, Timestamp};

/// Port for payment gateway integrations.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Refunds `amount` against a previous charge.
    async fn request_refund(&self, request: RefundRequest) -> Result<RefundReceipt, PaymentError>;

    /// Verifies a webhook signature and parses the event.
    ///
    /// Returns error if the signature is invalid, stale, or the payload malformed.
    async fn verify_webhook(&self, payload: &[u8], signature: &str) -> Result<PaymentEvent, PaymentError>;
}

/// Refund request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundRequest {
    /// Gateway reference of the charge being refunded.
    pub payment_reference: String,

    pub amount: Money,

    /// Same key for the same subscription period, so retries cannot refund twice.
    pub idempotency_key: String,
}

/// Confirmation of an issued refund.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundReceipt {
    /// Gateway's refund id.
    pub refund_id: String,
    pub amount: Money,
}

/// Verified event from the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentEvent {
    /// Gateway event id, used for deduplication.
    pub event_id: String,

    pub kind: PaymentEventKind,

    pub occurred_at: Timestamp,
}

/// Event kinds the engine acts on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentEventKind {
    /// First charge for a pending subscription succeeded.
    ChargeSucceeded {
        subscription_id: SubscriptionId,
        payment_reference: String,
    },

    /// First charge for a pending subscription failed.
    ChargeFailed {
        subscription_id: SubscriptionId,
        reason: String,
    },

    /// Charge for the next period of an active subscription succeeded.
    RenewalPaid {
        subscription_id: SubscriptionId,
        payment_reference: String,
    },

    /// Anything else; acknowledged and ignored.
    Unknown { event_type: String },
}

impl PaymentEventKind {
    pub fn event_type(&self) -> &str {
        match self {
            PaymentEventKind::ChargeSucceeded { .. } => "charge_succeeded",
            PaymentEventKind::ChargeFailed { .. } => "charge_failed",
            PaymentEventKind::RenewalPaid { .. } => "renewal_paid",
            PaymentEventKind::Unknown { event_type } => event_type,
        }
    }

    pub fn subscription_id(&self) -> Option<SubscriptionId> {
        match self {
            PaymentEventKind::ChargeSucceeded { subscription_id, .. }
            | PaymentEventKind::ChargeFailed { subscription_id, .. }
            | PaymentEventKind::RenewalPaid { subscription_id, .. } => Some(*subscription_id),
            PaymentEventKind::Unknown { .. } => None,
        }
    }
}

/// Errors from payment gateway operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentError {
    pub code: PaymentErrorCode,

    pub message: String,

    /// Gateway's own error code, if it sent one.
    pub provider_code: Option<String>,

    pub retryable: bool,
}

impl PaymentError {
    pub fn new(code: PaymentErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider_code: None,
            retryable: code.is_retryable(),
        }
    }

    pub fn with_provider_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::NetworkError, message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::AuthenticationError, message)
    }

    pub fn refund_declined(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::RefundDeclined, message)
    }

    pub fn invalid_webhook(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::InvalidWebhook, message)
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::ProviderError, message)
    }
}

impl std::fmt::Display for PaymentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for PaymentError {}

impl From<PaymentError> for DomainError {
    fn from(err: PaymentError) -> Self {
        let code = match err.code {
            PaymentErrorCode::RefundDeclined => ErrorCode::RefundFailed,
            PaymentErrorCode::InvalidWebhook => ErrorCode::InvalidWebhook,
            _ => ErrorCode::InternalError,
        };
        DomainError::new(code, err.message)
    }
}

/// Payment error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentErrorCode {
    NetworkError,
    AuthenticationError,
    /// Gateway refused the refund (e.g. charge already refunded or disputed).
    RefundDeclined,
    NotFound,
    RateLimitExceeded,
    InvalidWebhook,
    ProviderError,
}

impl PaymentErrorCode {
    /// Check if this error type is typically retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PaymentErrorCode::NetworkError
                | PaymentErrorCode::RateLimitExceeded
                | PaymentErrorCode::ProviderError
        )
    }
}

impl std::fmt::Display for PaymentErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentErrorCode::NetworkError => "network_error",
            PaymentErrorCode::AuthenticationError => "authentication_error",
            PaymentErrorCode::RefundDeclined => "refund_declined",
            PaymentErrorCode::NotFound => "not_found",
            PaymentErrorCode::RateLimitExceeded => "rate_limit_exceeded",
            PaymentErrorCode::InvalidWebhook => "invalid_webhook",
            PaymentErrorCode::ProviderError => "provider_error",
        };
        write!(f, "{}", s)
    }
}
