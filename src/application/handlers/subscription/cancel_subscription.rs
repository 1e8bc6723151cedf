//! CancelSubscriptionHandler - Command handler for the three cancellation modes.

use std::sync::Arc;

use super::rollover::{publish_events, replace_with_free, settle_current};
use crate::application::OwnerLocks;
use crate::domain::foundation::{OwnerId, Timestamp};
use crate::domain::subscription::{
    AccountKind, CancellationMode, ExpiredReason, Subscription, SubscriptionChange,
    SubscriptionError, SubscriptionEvent, SubscriptionKey,
};
use crate::ports::{Clock, EventPublisher, PaymentGateway, RefundReceipt, RefundRequest, SubscriptionRepository};

/// Command to cancel the owner's current subscription.
#[derive(Debug, Clone)]
pub struct CancelSubscriptionCommand {
    pub owner_id: OwnerId,
    pub account_kind: AccountKind,
    pub mode: CancellationMode,
}

/// Result of a cancellation.
#[derive(Debug, Clone)]
pub struct CancelSubscriptionResult {
    /// The cancelled record: `cancelling` or `expired`.
    pub subscription: Subscription,
    /// Free-tier record that replaced it, for immediate modes.
    pub replacement: Option<Subscription>,
    /// Issued refund; `None` when nothing was owed.
    pub refund: Option<RefundReceipt>,
    /// When benefits end.
    pub effective_at: Timestamp,
}

/// Handler for cancelling subscriptions.
///
/// `EndOfPeriod` keeps benefits until the period ends. `WithRefund` and
/// `Immediate` end them now and move the owner to the free tier. A refund is
/// requested before anything is written; if the gateway refuses, nothing changes.
pub struct CancelSubscriptionHandler {
    repository: Arc<dyn SubscriptionRepository>,
    gateway: Arc<dyn PaymentGateway>,
    event_publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    locks: Arc<OwnerLocks>,
}

impl CancelSubscriptionHandler {
    pub fn new(
        repository: Arc<dyn SubscriptionRepository>,
        gateway: Arc<dyn PaymentGateway>,
        event_publisher: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
        locks: Arc<OwnerLocks>,
    ) -> Self {
        Self {
            repository,
            gateway,
            event_publisher,
            clock,
            locks,
        }
    }

    pub async fn handle(
        &self,
        cmd: CancelSubscriptionCommand,
    ) -> Result<CancelSubscriptionResult, SubscriptionError> {
        let key = SubscriptionKey::new(cmd.owner_id, cmd.account_kind);
        let _guard = self.locks.lock(&key).await;
        let now = self.clock.now();

        let settlement = settle_current(self.repository.as_ref(), &key, now).await?;
        publish_events(self.event_publisher.as_ref(), settlement.events).await;
        let current = settlement
            .current
            .ok_or_else(|| SubscriptionError::not_found(&key))?;

        let result = match cmd.mode {
            CancellationMode::EndOfPeriod => self.schedule(current, now).await,
            CancellationMode::Immediate => self.end_now(current, now).await,
            CancellationMode::WithRefund => self.refund_and_end(current, now).await,
        };

        match &result {
            Ok(done) => tracing::info!(
                subscription_id = %done.subscription.id,
                owner_id = %key.owner_id,
                account_kind = %key.account_kind,
                mode = %cmd.mode,
                effective_at = %done.effective_at,
                "Subscription cancelled"
            ),
            Err(e) => tracing::warn!(
                owner_id = %key.owner_id,
                account_kind = %key.account_kind,
                mode = %cmd.mode,
                error = %e,
                "Cancellation rejected"
            ),
        }
        result
    }

    async fn schedule(
        &self,
        mut subscription: Subscription,
        now: Timestamp,
    ) -> Result<CancelSubscriptionResult, SubscriptionError> {
        subscription.schedule_cancellation(now)?;
        let subscription = self.repository.update(subscription).await?;
        let effective_at = subscription.current_period_end;

        let event = SubscriptionEvent::new(
            &subscription,
            SubscriptionChange::CancellationScheduled { effective_at },
            now,
        );
        publish_events(self.event_publisher.as_ref(), vec![event]).await;

        Ok(CancelSubscriptionResult {
            subscription,
            replacement: None,
            refund: None,
            effective_at,
        })
    }

    async fn end_now(
        &self,
        subscription: Subscription,
        now: Timestamp,
    ) -> Result<CancelSubscriptionResult, SubscriptionError> {
        subscription.ensure_can_end_immediately()?;
        let replacement = replace_with_free(
            self.repository.as_ref(),
            subscription,
            ExpiredReason::ImmediateCancellation,
            now,
        )
        .await?;
        publish_events(self.event_publisher.as_ref(), replacement.events).await;

        Ok(CancelSubscriptionResult {
            subscription: replacement.expired,
            replacement: Some(replacement.free),
            refund: None,
            effective_at: now,
        })
    }

    async fn refund_and_end(
        &self,
        subscription: Subscription,
        now: Timestamp,
    ) -> Result<CancelSubscriptionResult, SubscriptionError> {
        let (quote, payment_reference) = subscription.refund_quote(now)?;

        // Last step before the commit
        let refund = if quote.amount.is_zero() {
            None
        } else {
            let request = RefundRequest {
                payment_reference,
                amount: quote.amount,
                idempotency_key: refund_idempotency_key(&subscription),
            };
            let receipt = self.gateway.request_refund(request).await.map_err(|e| {
                tracing::warn!(
                    subscription_id = %subscription.id,
                    code = ?e.code,
                    retryable = e.retryable,
                    error = %e.message,
                    "Refund refused by gateway"
                );
                SubscriptionError::refund_failed(subscription.id, e.message, e.retryable)
            })?;
            Some(receipt)
        };

        let subscription_id = subscription.id;
        let replacement = match replace_with_free(
            self.repository.as_ref(),
            subscription,
            ExpiredReason::RefundCancellation,
            now,
        )
        .await
        {
            Ok(replacement) => replacement,
            Err(e) => {
                if let Some(receipt) = &refund {
                    tracing::error!(
                        subscription_id = %subscription_id,
                        refund_id = %receipt.refund_id,
                        amount = %receipt.amount,
                        error = %e,
                        "Refund issued but cancellation was not recorded"
                    );
                }
                return Err(e);
            }
        };

        let mut events = Vec::with_capacity(3);
        if let Some(receipt) = &refund {
            events.push(SubscriptionEvent::new(
                &replacement.expired,
                SubscriptionChange::RefundIssued {
                    amount: receipt.amount,
                    refund_id: receipt.refund_id.clone(),
                    remaining_days: quote.remaining_days,
                    total_days: quote.total_days,
                },
                now,
            ));
        }
        events.extend(replacement.events);
        publish_events(self.event_publisher.as_ref(), events).await;

        Ok(CancelSubscriptionResult {
            subscription: replacement.expired,
            replacement: Some(replacement.free),
            refund,
            effective_at: now,
        })
    }
}

/// Stable per billing period, so a retried cancellation cannot refund twice.
fn refund_idempotency_key(subscription: &Subscription) -> String {
    format!(
        "refund:{}:{}",
        subscription.id,
        subscription.current_period_start.as_unix_secs()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::events::InMemoryEventBus;
    use crate::adapters::memory::InMemorySubscriptionRepository;
    use crate::adapters::payment::MockPaymentGateway;
    use crate::domain::foundation::Money;
    use crate::domain::subscription::{PlanCatalog, PlanTier, SubscriptionStatus};
    use crate::ports::{FixedClock, PaymentError};

    struct Fixture {
        repo: Arc<InMemorySubscriptionRepository>,
        gateway: MockPaymentGateway,
        bus: Arc<InMemoryEventBus>,
        clock: Arc<FixedClock>,
        handler: CancelSubscriptionHandler,
    }

    fn t0() -> Timestamp {
        // 2024-06-01, a 30-day month
        Timestamp::from_unix_secs(1_717_200_000).unwrap()
    }

    fn fixture() -> Fixture {
        let repo = Arc::new(InMemorySubscriptionRepository::new());
        let gateway = MockPaymentGateway::new();
        let bus = Arc::new(InMemoryEventBus::new());
        let clock = Arc::new(FixedClock::new(t0()));
        let handler = CancelSubscriptionHandler::new(
            repo.clone(),
            Arc::new(gateway.clone()),
            bus.clone(),
            clock.clone(),
            Arc::new(OwnerLocks::new()),
        );
        Fixture {
            repo,
            gateway,
            bus,
            clock,
            handler,
        }
    }

    fn owner() -> OwnerId {
        OwnerId::new("pro-1").unwrap()
    }

    fn cancel(mode: CancellationMode) -> CancelSubscriptionCommand {
        CancelSubscriptionCommand {
            owner_id: owner(),
            account_kind: AccountKind::Professional,
            mode,
        }
    }

    async fn insert_active(f: &Fixture, price: u32) -> Subscription {
        let plan = PlanCatalog::lookup(AccountKind::Professional, PlanTier::Tier2).unwrap();
        let mut sub = Subscription::create_pending(owner(), &plan, Money::from_minor(price), false, t0());
        sub.activate("ch_1", t0()).unwrap();
        f.repo.insert(sub).await.unwrap()
    }

    // ════════════════════════════════════════════════════════════════════════════
    // End of Period
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn end_of_period_keeps_benefits_until_period_end() {
        let f = fixture();
        let sub = insert_active(&f, 999).await;
        f.clock.advance_days(5);

        let result = f.handler.handle(cancel(CancellationMode::EndOfPeriod)).await.unwrap();

        assert_eq!(result.subscription.status, SubscriptionStatus::Cancelling);
        assert_eq!(result.subscription.cancelled_at, Some(t0().add_days(5)));
        assert_eq!(result.effective_at, sub.current_period_end);
        assert_eq!(result.subscription.quota, sub.quota);
        assert!(result.refund.is_none());
        assert_eq!(f.gateway.refund_requests().len(), 0);
        assert!(f.bus.has_event("subscription.cancellation_scheduled.v1"));
    }

    #[tokio::test]
    async fn end_of_period_twice_is_invalid_state() {
        let f = fixture();
        insert_active(&f, 999).await;
        f.handler.handle(cancel(CancellationMode::EndOfPeriod)).await.unwrap();

        let result = f.handler.handle(cancel(CancellationMode::EndOfPeriod)).await;

        assert!(matches!(result, Err(SubscriptionError::InvalidState { .. })));
    }

    // ════════════════════════════════════════════════════════════════════════════
    // With Refund
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn refund_is_prorated_and_owner_moves_to_free() {
        let f = fixture();
        let sub = insert_active(&f, 1200).await;
        f.clock.advance_days(10);

        let result = f.handler.handle(cancel(CancellationMode::WithRefund)).await.unwrap();

        let refund = result.refund.unwrap();
        assert_eq!(refund.amount, Money::from_minor(800));
        assert_eq!(result.subscription.status, SubscriptionStatus::Expired);
        let free = result.replacement.unwrap();
        assert_eq!(free.tier, PlanTier::Free);
        assert_eq!(result.subscription.superseded_by, Some(free.id));

        let requests = f.gateway.refund_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].payment_reference, "ch_1");
        assert_eq!(
            requests[0].idempotency_key,
            format!("refund:{}:{}", sub.id, t0().as_unix_secs())
        );
        assert!(f.bus.has_event("subscription.refund_issued.v1"));
        assert!(f.bus.has_event("subscription.expired.v1"));
    }

    #[tokio::test]
    async fn refund_failure_changes_nothing() {
        let f = fixture();
        let sub = insert_active(&f, 1200).await;
        f.clock.advance_days(10);
        f.gateway.fail_next_refund(PaymentError::network("connection reset"));

        let result = f.handler.handle(cancel(CancellationMode::WithRefund)).await;

        match result {
            Err(SubscriptionError::RefundFailed { retryable, .. }) => assert!(retryable),
            other => panic!("expected RefundFailed, got {:?}", other),
        }
        let stored = f.repo.find_by_id(&sub.id).await.unwrap().unwrap();
        assert_eq!(stored, sub);
        assert_eq!(f.repo.len().await, 1);
        assert_eq!(f.bus.event_count(), 0);
    }

    #[tokio::test]
    async fn refund_allowed_while_cancelling() {
        let f = fixture();
        insert_active(&f, 1200).await;
        f.handler.handle(cancel(CancellationMode::EndOfPeriod)).await.unwrap();
        f.clock.advance_days(15);

        let result = f.handler.handle(cancel(CancellationMode::WithRefund)).await.unwrap();

        assert_eq!(result.refund.unwrap().amount, Money::from_minor(600));
    }

    #[tokio::test]
    async fn nothing_owed_skips_gateway() {
        let f = fixture();
        insert_active(&f, 1200).await;
        f.clock.set(t0().add_days(30).plus_secs(-60));

        let result = f.handler.handle(cancel(CancellationMode::WithRefund)).await.unwrap();

        assert!(result.refund.is_none());
        assert_eq!(f.gateway.refund_requests().len(), 0);
        assert_eq!(result.subscription.status, SubscriptionStatus::Expired);
    }

    #[tokio::test]
    async fn refund_without_payment_reference_is_rejected() {
        let f = fixture();
        let plan = PlanCatalog::lookup(AccountKind::Professional, PlanTier::Tier2).unwrap();
        let mut sub = Subscription::create_pending(owner(), &plan, plan.base_price, false, t0());
        sub.activate("ch_1", t0()).unwrap();
        sub.payment_reference_id = None;
        f.repo.insert(sub).await.unwrap();

        let result = f.handler.handle(cancel(CancellationMode::WithRefund)).await;

        assert!(matches!(result, Err(SubscriptionError::MissingPaymentReference(_))));
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Immediate
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn immediate_expires_now_without_refund() {
        let f = fixture();
        insert_active(&f, 1200).await;
        f.clock.advance_days(5);

        let result = f.handler.handle(cancel(CancellationMode::Immediate)).await.unwrap();

        assert_eq!(result.subscription.status, SubscriptionStatus::Expired);
        assert_eq!(result.effective_at, t0().add_days(5));
        assert!(result.refund.is_none());
        assert_eq!(f.gateway.refund_requests().len(), 0);
        let free = result.replacement.unwrap();
        assert_eq!(free.current_period_start, t0().add_days(5));
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Rejections
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn free_tier_cannot_be_cancelled() {
        let f = fixture();
        f.repo
            .insert(Subscription::create_free(owner(), AccountKind::Professional, false, t0()))
            .await
            .unwrap();

        for mode in [
            CancellationMode::EndOfPeriod,
            CancellationMode::WithRefund,
            CancellationMode::Immediate,
        ] {
            let result = f.handler.handle(cancel(mode)).await;
            assert!(
                matches!(result, Err(SubscriptionError::InvalidState { .. })),
                "mode {} should be rejected",
                mode
            );
        }
    }

    #[tokio::test]
    async fn no_subscription_is_not_found() {
        let f = fixture();
        let result = f.handler.handle(cancel(CancellationMode::Immediate)).await;
        assert!(matches!(result, Err(SubscriptionError::NotFound(_))));
    }
}
