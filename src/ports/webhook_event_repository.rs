//! WebhookEventRepository port - idempotency ledger for gateway webhooks.
//!
//! The gateway may deliver the same event more than once (timeouts, retries
//! after a 5xx, lost acknowledgements). Every handled event id is recorded so
//! replays become no-ops.

use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{DomainError, Timestamp, ValidationError};

/// How a webhook event was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WebhookDisposition {
    Success,
    Ignored,
    Failed,
}

impl WebhookDisposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookDisposition::Success => "success",
            WebhookDisposition::Ignored => "ignored",
            WebhookDisposition::Failed => "failed",
        }
    }
}

impl fmt::Display for WebhookDisposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WebhookDisposition {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(WebhookDisposition::Success),
            "ignored" => Ok(WebhookDisposition::Ignored),
            "failed" => Ok(WebhookDisposition::Failed),
            other => Err(ValidationError::invalid_format(
                "result",
                format!("unknown webhook disposition '{}'", other),
            )),
        }
    }
}

/// Record of a processed webhook event.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEventRecord {
    /// Gateway event id.
    pub event_id: String,

    pub event_type: String,

    pub processed_at: Timestamp,

    pub result: WebhookDisposition,

    /// Reason for `Ignored`, error for `Failed`.
    pub error_message: Option<String>,

    /// Original payload for debugging.
    pub payload: serde_json::Value,
}

impl WebhookEventRecord {
    pub fn success(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
        processed_at: Timestamp,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            event_type: event_type.into(),
            processed_at,
            result: WebhookDisposition::Success,
            error_message: None,
            payload,
        }
    }

    pub fn ignored(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        reason: impl Into<String>,
        payload: serde_json::Value,
        processed_at: Timestamp,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            event_type: event_type.into(),
            processed_at,
            result: WebhookDisposition::Ignored,
            error_message: Some(reason.into()),
            payload,
        }
    }

    pub fn failed(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        error: impl Into<String>,
        payload: serde_json::Value,
        processed_at: Timestamp,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            event_type: event_type.into(),
            processed_at,
            result: WebhookDisposition::Failed,
            error_message: Some(error.into()),
            payload,
        }
    }
}

/// Result of attempting to save a webhook event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveResult {
    /// First time seeing this event.
    Inserted,
    /// Another delivery already recorded it.
    AlreadyExists,
}

/// Port for storing processed webhook events.
///
/// Implementations should use a primary key on `event_id` so concurrent
/// deliveries cannot both insert.
#[async_trait]
pub trait WebhookEventRepository: Send + Sync {
    /// Find a previously processed event.
    async fn find_by_event_id(&self, event_id: &str) -> Result<Option<WebhookEventRecord>, DomainError>;

    /// Save with `ON CONFLICT DO NOTHING` semantics.
    async fn save(&self, record: WebhookEventRecord) -> Result<SaveResult, DomainError>;

    /// Delete records processed before `cutoff`; returns how many were removed.
    async fn delete_before(&self, cutoff: Timestamp) -> Result<u64, DomainError>;
}
