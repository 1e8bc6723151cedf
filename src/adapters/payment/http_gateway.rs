//! HTTP payment gateway adapter.
//!
//! Talks to a Stripe-style REST API: form-encoded requests authenticated with
//! the secret key as HTTP basic-auth user, and JSON webhooks signed with
//! HMAC-SHA256 (see [`super::signature`]).
//!
//! ```ignore
//! let config = HttpGatewayConfig::new(api_key, webhook_secret);
//! let gateway = HttpPaymentGateway::new(config);
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::domain::foundation::{Money, SubscriptionId, Timestamp};
use crate::ports::{
    Clock, PaymentError, PaymentErrorCode, PaymentEvent, PaymentEventKind, PaymentGateway,
    RefundReceipt, RefundRequest, SystemClock,
};

use super::signature::verify_signature;

pub const DEFAULT_BASE_URL: &str = "https://api.stripe.com";

/// Gateway connection settings.
#[derive(Clone)]
pub struct HttpGatewayConfig {
    api_key: SecretString,
    webhook_secret: SecretString,
    base_url: String,
}

impl HttpGatewayConfig {
    pub fn new(api_key: impl Into<String>, webhook_secret: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::new(api_key.into()),
            webhook_secret: SecretString::new(webhook_secret.into()),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl std::fmt::Debug for HttpGatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpGatewayConfig")
            .field("api_key", &"[REDACTED]")
            .field("webhook_secret", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Payment gateway backed by the provider's REST API.
pub struct HttpPaymentGateway {
    config: HttpGatewayConfig,
    http_client: reqwest::Client,
    clock: Arc<dyn Clock>,
}

impl HttpPaymentGateway {
    pub fn new(config: HttpGatewayConfig) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Uses `clock` for webhook freshness checks.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn parse_event(&self, payload: &[u8]) -> Result<PaymentEvent, PaymentError> {
        let raw: RawWebhookEvent = serde_json::from_slice(payload).map_err(|e| {
            tracing::warn!(error = %e, "Failed to parse webhook payload");
            PaymentError::invalid_webhook(format!("Invalid JSON: {}", e))
        })?;

        let occurred_at = Timestamp::from_unix_secs(raw.created)
            .ok_or_else(|| PaymentError::invalid_webhook("Invalid event timestamp"))?;

        let kind = match raw.event_type.as_str() {
            "charge.succeeded" => PaymentEventKind::ChargeSucceeded {
                subscription_id: raw.data.subscription_id()?,
                payment_reference: raw.data.payment_reference()?,
            },
            "charge.failed" => PaymentEventKind::ChargeFailed {
                subscription_id: raw.data.subscription_id()?,
                reason: raw
                    .data
                    .failure_reason
                    .clone()
                    .unwrap_or_else(|| "unspecified".to_string()),
            },
            "invoice.paid" => PaymentEventKind::RenewalPaid {
                subscription_id: raw.data.subscription_id()?,
                payment_reference: raw.data.payment_reference()?,
            },
            other => PaymentEventKind::Unknown {
                event_type: other.to_string(),
            },
        };

        Ok(PaymentEvent {
            event_id: raw.id,
            kind,
            occurred_at,
        })
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn request_refund(&self, request: RefundRequest) -> Result<RefundReceipt, PaymentError> {
        let url = format!("{}/v1/refunds", self.config.base_url);
        let params = [
            ("payment_reference", request.payment_reference.clone()),
            ("amount", request.amount.minor_units().to_string()),
        ];

        let response = self
            .http_client
            .post(&url)
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .header("Idempotency-Key", &request.idempotency_key)
            .form(&params)
            .send()
            .await
            .map_err(|e| PaymentError::network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!(
                status = status.as_u16(),
                error = %error_text,
                payment_reference = %request.payment_reference,
                "Refund request failed"
            );
            return Err(map_status(status, error_text));
        }

        let refund: RawRefund = response.json().await.map_err(|e| {
            PaymentError::provider(format!("Failed to parse refund response: {}", e))
        })?;

        let amount = Money::try_new(refund.amount)
            .map_err(|e| PaymentError::provider(format!("Invalid refund amount: {}", e)))?;

        Ok(RefundReceipt {
            refund_id: refund.id,
            amount,
        })
    }

    async fn verify_webhook(&self, payload: &[u8], signature: &str) -> Result<PaymentEvent, PaymentError> {
        verify_signature(
            self.config.webhook_secret.expose_secret().as_bytes(),
            payload,
            signature,
            self.clock.now().as_unix_secs(),
        )?;
        self.parse_event(payload)
    }
}

fn map_status(status: reqwest::StatusCode, body: String) -> PaymentError {
    let code = match status.as_u16() {
        401 | 403 => PaymentErrorCode::AuthenticationError,
        404 => PaymentErrorCode::NotFound,
        429 => PaymentErrorCode::RateLimitExceeded,
        400 | 402 | 409 => PaymentErrorCode::RefundDeclined,
        _ => PaymentErrorCode::ProviderError,
    };
    PaymentError::new(code, format!("Gateway error: {}", body)).with_provider_code(status.as_str())
}

/// Webhook envelope as sent by the gateway.
#[derive(Debug, Deserialize)]
struct RawWebhookEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    created: i64,
    #[serde(default)]
    data: RawEventData,
}

#[derive(Debug, Default, Deserialize)]
struct RawEventData {
    subscription_id: Option<String>,
    payment_reference: Option<String>,
    failure_reason: Option<String>,
}

impl RawEventData {
    fn subscription_id(&self) -> Result<SubscriptionId, PaymentError> {
        self.subscription_id
            .as_deref()
            .ok_or_else(|| PaymentError::invalid_webhook("Missing subscription_id"))?
            .parse()
            .map_err(|_| PaymentError::invalid_webhook("Malformed subscription_id"))
    }

    fn payment_reference(&self) -> Result<String, PaymentError> {
        self.payment_reference
            .clone()
            .filter(|r| !r.trim().is_empty())
            .ok_or_else(|| PaymentError::invalid_webhook("Missing payment_reference"))
    }
}

#[derive(Debug, Deserialize)]
struct RawRefund {
    id: String,
    amount: i64,
}
