//! Mock payment gateway for tests.
//!
//! Supports:
//! - Error injection for refunds
//! - Refund call tracking
//! - Idempotency-key replay (same key returns the first receipt)
//! - Webhook verification that accepts any signature, or rejects all

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::ports::{PaymentError, PaymentEvent, PaymentGateway, RefundReceipt, RefundRequest};

/// Mock payment gateway.
///
/// ```ignore
/// let gateway = MockPaymentGateway::new();
/// gateway.fail_next_refund(PaymentError::network("timeout"));
/// let payload = MockPaymentGateway::event_payload(&event);
/// ```
#[derive(Debug, Default, Clone)]
pub struct MockPaymentGateway {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Debug, Default)]
struct MockState {
    refund_requests: Vec<RefundRequest>,
    receipts_by_key: HashMap<String, RefundReceipt>,
    next_refund_error: Option<PaymentError>,
    reject_signatures: bool,
    refund_counter: u32,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Next refund request fails with `error`.
    pub fn fail_next_refund(&self, error: PaymentError) {
        self.state().next_refund_error = Some(error);
    }

    /// Makes `verify_webhook` reject every signature.
    pub fn reject_signatures(&self, reject: bool) {
        self.state().reject_signatures = reject;
    }

    /// Every refund request received, including failed ones.
    pub fn refund_requests(&self) -> Vec<RefundRequest> {
        self.state().refund_requests.clone()
    }

    /// Number of distinct refunds actually issued.
    pub fn issued_refund_count(&self) -> usize {
        self.state().receipts_by_key.len()
    }

    /// Serializes an event the way `verify_webhook` expects it.
    pub fn event_payload(event: &PaymentEvent) -> Vec<u8> {
        serde_json::to_vec(event).unwrap_or_default()
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn request_refund(&self, request: RefundRequest) -> Result<RefundReceipt, PaymentError> {
        let mut state = self.state();
        state.refund_requests.push(request.clone());

        if let Some(error) = state.next_refund_error.take() {
            return Err(error);
        }

        if let Some(receipt) = state.receipts_by_key.get(&request.idempotency_key) {
            return Ok(receipt.clone());
        }

        state.refund_counter += 1;
        let receipt = RefundReceipt {
            refund_id: format!("re_mock_{}", state.refund_counter),
            amount: request.amount,
        };
        state
            .receipts_by_key
            .insert(request.idempotency_key, receipt.clone());
        Ok(receipt)
    }

    async fn verify_webhook(&self, payload: &[u8], _signature: &str) -> Result<PaymentEvent, PaymentError> {
        if self.state().reject_signatures {
            return Err(PaymentError::invalid_webhook("Invalid signature"));
        }
        serde_json::from_slice(payload)
            .map_err(|e| PaymentError::invalid_webhook(format!("Invalid JSON: {}", e)))
    }
}
