//! HandlePaymentWebhookHandler - Command handler for payment gateway webhooks.
//!
//! Every verified event is processed at most once: the gateway event id is
//! looked up in the webhook ledger before dispatch and recorded after, both
//! under the lock of the owner the event refers to.

use std::sync::Arc;

use super::rollover::{publish_events, settle_current};
use crate::application::OwnerLocks;
use crate::domain::foundation::{SubscriptionId, Timestamp};
use crate::domain::subscription::{
    ExpiredReason, Subscription, SubscriptionChange, SubscriptionError, SubscriptionEvent,
    SubscriptionStatus,
};
use crate::ports::{
    Clock, EventPublisher, PaymentEvent, PaymentEventKind, PaymentGateway, SaveResult,
    SubscriptionRepository, SubscriptionWrite, WebhookEventRecord, WebhookEventRepository,
};

/// Command to handle a payment webhook.
#[derive(Debug, Clone)]
pub struct HandlePaymentWebhookCommand {
    /// Raw webhook payload.
    pub payload: Vec<u8>,
    /// Webhook signature header.
    pub signature: String,
}

/// Result of webhook processing.
#[derive(Debug, Clone)]
pub enum HandlePaymentWebhookResult {
    /// First charge confirmed; the pending record is now active.
    Activated { subscription: Subscription },
    /// Next-period payment recorded on the active record.
    RenewalRecorded { subscription: Subscription },
    /// First charge declined; the record stays pending.
    ChargeFailed {
        subscription_id: SubscriptionId,
        reason: String,
    },
    /// Event or its effect was already applied.
    Duplicate { event_id: String },
    /// Acknowledged without action.
    Ignored { reason: String },
}

/// Handler for processing payment gateway webhooks.
pub struct HandlePaymentWebhookHandler {
    repository: Arc<dyn SubscriptionRepository>,
    gateway: Arc<dyn PaymentGateway>,
    webhook_events: Arc<dyn WebhookEventRepository>,
    event_publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    locks: Arc<OwnerLocks>,
}

impl HandlePaymentWebhookHandler {
    pub fn new(
        repository: Arc<dyn SubscriptionRepository>,
        gateway: Arc<dyn PaymentGateway>,
        webhook_events: Arc<dyn WebhookEventRepository>,
        event_publisher: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
        locks: Arc<OwnerLocks>,
    ) -> Self {
        Self {
            repository,
            gateway,
            webhook_events,
            event_publisher,
            clock,
            locks,
        }
    }

    pub async fn handle(
        &self,
        cmd: HandlePaymentWebhookCommand,
    ) -> Result<HandlePaymentWebhookResult, SubscriptionError> {
        // 1. Verify webhook signature and parse event
        let event = self
            .gateway
            .verify_webhook(&cmd.payload, &cmd.signature)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e.message, "Webhook verification failed");
                SubscriptionError::invalid_webhook(e.message)
            })?;

        // 2. Serialize with every other change to the same owner, including
        //    concurrent deliveries of this event
        let _guard = match event.kind.subscription_id() {
            Some(id) => match self.repository.find_by_id(&id).await? {
                Some(found) => Some(self.locks.lock(&found.key()).await),
                None => None,
            },
            None => None,
        };

        // 3. Deduplicate by gateway event id
        if self
            .webhook_events
            .find_by_event_id(&event.event_id)
            .await?
            .is_some()
        {
            tracing::info!(event_id = %event.event_id, "Webhook event already processed");
            return Ok(HandlePaymentWebhookResult::Duplicate {
                event_id: event.event_id,
            });
        }

        // 4. Dispatch
        let now = self.clock.now();
        let outcome = self.dispatch(&event, now).await;

        // 5. Record in the ledger. Retryable failures are left out so the
        //    gateway's redelivery is processed.
        let payload = serde_json::from_slice(&cmd.payload).unwrap_or(serde_json::Value::Null);
        let event_type = event.kind.event_type().to_string();
        let record = match &outcome {
            Ok(HandlePaymentWebhookResult::Ignored { reason }) => Some(WebhookEventRecord::ignored(
                &event.event_id,
                event_type,
                reason.as_str(),
                payload,
                now,
            )),
            Ok(_) => Some(WebhookEventRecord::success(&event.event_id, event_type, payload, now)),
            Err(e) if !e.is_retryable() => Some(WebhookEventRecord::failed(
                &event.event_id,
                event_type,
                e.to_string(),
                payload,
                now,
            )),
            Err(_) => None,
        };

        if let Some(record) = record {
            match self.webhook_events.save(record).await {
                Ok(SaveResult::Inserted) => {}
                Ok(SaveResult::AlreadyExists) => tracing::debug!(
                    event_id = %event.event_id,
                    "Webhook event recorded by a concurrent delivery"
                ),
                Err(e) => tracing::error!(
                    event_id = %event.event_id,
                    error = %e,
                    "Failed to record processed webhook event"
                ),
            }
        }

        if let Err(e) = &outcome {
            tracing::warn!(
                event_id = %event.event_id,
                event_type = %event.kind.event_type(),
                error = %e,
                "Webhook event rejected"
            );
        }
        outcome
    }

    async fn dispatch(
        &self,
        event: &PaymentEvent,
        now: Timestamp,
    ) -> Result<HandlePaymentWebhookResult, SubscriptionError> {
        match &event.kind {
            PaymentEventKind::ChargeSucceeded {
                subscription_id,
                payment_reference,
            } => {
                self.handle_charge_succeeded(event, *subscription_id, payment_reference, now)
                    .await
            }
            PaymentEventKind::ChargeFailed {
                subscription_id,
                reason,
            } => self.handle_charge_failed(*subscription_id, reason, now).await,
            PaymentEventKind::RenewalPaid {
                subscription_id,
                payment_reference,
            } => {
                self.handle_renewal_paid(event, *subscription_id, payment_reference, now)
                    .await
            }
            PaymentEventKind::Unknown { event_type } => {
                tracing::debug!(event_type = %event_type, "Ignoring unhandled webhook event");
                Ok(HandlePaymentWebhookResult::Ignored {
                    reason: format!("Unhandled event type {}", event_type),
                })
            }
        }
    }

    async fn handle_charge_succeeded(
        &self,
        event: &PaymentEvent,
        subscription_id: SubscriptionId,
        payment_reference: &str,
        now: Timestamp,
    ) -> Result<HandlePaymentWebhookResult, SubscriptionError> {
        let Some(mut pending) = self.repository.find_by_id(&subscription_id).await? else {
            return Ok(unknown_subscription(subscription_id));
        };
        let key = pending.key();

        if pending.status != SubscriptionStatus::PendingPayment {
            if pending.payment_reference_id.as_deref() == Some(payment_reference) {
                return Ok(HandlePaymentWebhookResult::Duplicate {
                    event_id: event.event_id.clone(),
                });
            }
            return Err(SubscriptionError::invalid_state(pending.status, "activate"));
        }

        let settlement = settle_current(self.repository.as_ref(), &key, now).await?;
        publish_events(self.event_publisher.as_ref(), settlement.events).await;

        pending.activate(payment_reference, now)?;

        // Expire the current record first so at most one record carries benefits
        // at every step.
        let mut writes = Vec::with_capacity(2);
        let mut events = Vec::with_capacity(2);
        if let Some(mut current) = settlement.current {
            current.supersede(pending.id, now)?;
            events.push(SubscriptionEvent::expired(&current, ExpiredReason::Superseded, now));
            writes.push(SubscriptionWrite::Update(current));
        }
        events.push(SubscriptionEvent::new(
            &pending,
            SubscriptionChange::Activated {
                tier: pending.tier,
                payment_reference: payment_reference.to_string(),
                period_start: pending.current_period_start,
                period_end: pending.current_period_end,
            },
            now,
        ));
        writes.push(SubscriptionWrite::Update(pending));

        let subscription = self
            .repository
            .apply(writes)
            .await?
            .pop()
            .ok_or_else(|| SubscriptionError::infrastructure("Repository returned an empty batch"))?;

        tracing::info!(
            subscription_id = %subscription.id,
            owner_id = %subscription.owner_id,
            account_kind = %subscription.account_kind,
            tier = %subscription.tier,
            "Subscription activated"
        );
        publish_events(self.event_publisher.as_ref(), events).await;

        Ok(HandlePaymentWebhookResult::Activated { subscription })
    }

    async fn handle_charge_failed(
        &self,
        subscription_id: SubscriptionId,
        reason: &str,
        now: Timestamp,
    ) -> Result<HandlePaymentWebhookResult, SubscriptionError> {
        let Some(subscription) = self.repository.find_by_id(&subscription_id).await? else {
            return Ok(unknown_subscription(subscription_id));
        };
        if subscription.status != SubscriptionStatus::PendingPayment {
            return Ok(HandlePaymentWebhookResult::Ignored {
                reason: format!("Subscription {} is not awaiting payment", subscription_id),
            });
        }

        tracing::warn!(
            subscription_id = %subscription.id,
            owner_id = %subscription.owner_id,
            account_kind = %subscription.account_kind,
            reason = %reason,
            "Charge failed; subscription stays pending"
        );
        let event = SubscriptionEvent::new(
            &subscription,
            SubscriptionChange::ChargeFailed {
                reason: reason.to_string(),
            },
            now,
        );
        publish_events(self.event_publisher.as_ref(), vec![event]).await;

        Ok(HandlePaymentWebhookResult::ChargeFailed {
            subscription_id,
            reason: reason.to_string(),
        })
    }

    async fn handle_renewal_paid(
        &self,
        event: &PaymentEvent,
        subscription_id: SubscriptionId,
        payment_reference: &str,
        now: Timestamp,
    ) -> Result<HandlePaymentWebhookResult, SubscriptionError> {
        let Some(mut subscription) = self.repository.find_by_id(&subscription_id).await? else {
            return Ok(unknown_subscription(subscription_id));
        };
        let key = subscription.key();

        let already_recorded = subscription.next_period_payment_reference.as_deref()
            == Some(payment_reference)
            || subscription.payment_reference_id.as_deref() == Some(payment_reference);
        if already_recorded {
            return Ok(HandlePaymentWebhookResult::Duplicate {
                event_id: event.event_id.clone(),
            });
        }

        subscription.record_renewal_payment(payment_reference, now)?;
        let subscription = self.repository.update(subscription).await?;
        tracing::info!(
            subscription_id = %subscription.id,
            owner_id = %subscription.owner_id,
            account_kind = %subscription.account_kind,
            "Renewal payment recorded"
        );

        let mut events = vec![SubscriptionEvent::new(
            &subscription,
            SubscriptionChange::RenewalPaymentRecorded {
                payment_reference: payment_reference.to_string(),
            },
            now,
        )];

        // A late renewal for an ended period rolls it forward right away
        let settlement = settle_current(self.repository.as_ref(), &key, now).await?;
        events.extend(settlement.events);
        publish_events(self.event_publisher.as_ref(), events).await;

        Ok(HandlePaymentWebhookResult::RenewalRecorded {
            subscription: settlement.current.unwrap_or(subscription),
        })
    }
}

fn unknown_subscription(subscription_id: SubscriptionId) -> HandlePaymentWebhookResult {
    tracing::warn!(subscription_id = %subscription_id, "Webhook references unknown subscription");
    HandlePaymentWebhookResult::Ignored {
        reason: format!("Unknown subscription {}", subscription_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::events::InMemoryEventBus;
    use crate::adapters::memory::{InMemorySubscriptionRepository, InMemoryWebhookEventRepository};
    use crate::adapters::payment::MockPaymentGateway;
    use crate::domain::foundation::OwnerId;
    use crate::domain::subscription::{AccountKind, PlanCatalog, PlanTier, SubscriptionKey};
    use crate::ports::WebhookDisposition;

    struct Fixture {
        repo: Arc<InMemorySubscriptionRepository>,
        gateway: MockPaymentGateway,
        ledger: Arc<InMemoryWebhookEventRepository>,
        bus: Arc<InMemoryEventBus>,
        clock: Arc<crate::ports::FixedClock>,
        handler: HandlePaymentWebhookHandler,
    }

    fn t0() -> Timestamp {
        Timestamp::from_unix_secs(1_717_200_000).unwrap()
    }

    fn fixture() -> Fixture {
        let repo = Arc::new(InMemorySubscriptionRepository::new());
        let gateway = MockPaymentGateway::new();
        let ledger = Arc::new(InMemoryWebhookEventRepository::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let clock = Arc::new(crate::ports::FixedClock::new(t0()));
        let handler = HandlePaymentWebhookHandler::new(
            repo.clone(),
            Arc::new(gateway.clone()),
            ledger.clone(),
            bus.clone(),
            clock.clone(),
            Arc::new(OwnerLocks::new()),
        );
        Fixture {
            repo,
            gateway,
            ledger,
            bus,
            clock,
            handler,
        }
    }

    fn owner() -> OwnerId {
        OwnerId::new("pro-1").unwrap()
    }

    fn key() -> SubscriptionKey {
        SubscriptionKey::new(owner(), AccountKind::Professional)
    }

    fn command(event_id: &str, kind: PaymentEventKind) -> HandlePaymentWebhookCommand {
        let event = PaymentEvent {
            event_id: event_id.to_string(),
            kind,
            occurred_at: t0(),
        };
        HandlePaymentWebhookCommand {
            payload: MockPaymentGateway::event_payload(&event),
            signature: "t=0,v1=00".to_string(),
        }
    }

    async fn insert_pending(f: &Fixture, tier: PlanTier) -> Subscription {
        let plan = PlanCatalog::lookup(AccountKind::Professional, tier).unwrap();
        f.repo
            .insert(Subscription::create_pending(owner(), &plan, plan.base_price, false, t0()))
            .await
            .unwrap()
    }

    fn charge_succeeded(id: SubscriptionId, reference: &str) -> PaymentEventKind {
        PaymentEventKind::ChargeSucceeded {
            subscription_id: id,
            payment_reference: reference.to_string(),
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Charge Succeeded
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn charge_activates_pending_and_supersedes_current() {
        let f = fixture();
        let free = f
            .repo
            .insert(Subscription::create_free(owner(), AccountKind::Professional, false, t0()))
            .await
            .unwrap();
        let pending = insert_pending(&f, PlanTier::Tier2).await;
        f.clock.advance_days(1);

        let result = f
            .handler
            .handle(command("evt_1", charge_succeeded(pending.id, "ch_1")))
            .await
            .unwrap();

        let HandlePaymentWebhookResult::Activated { subscription } = result else {
            panic!("expected activation, got {:?}", result);
        };
        assert_eq!(subscription.id, pending.id);
        assert_eq!(subscription.status, SubscriptionStatus::Active);
        assert_eq!(subscription.current_period_start, t0().add_days(1));
        assert_eq!(subscription.payment_reference_id.as_deref(), Some("ch_1"));

        let old = f.repo.find_by_id(&free.id).await.unwrap().unwrap();
        assert_eq!(old.status, SubscriptionStatus::Expired);
        assert_eq!(old.superseded_by, Some(pending.id));
        assert!(f.bus.has_event("subscription.activated.v1"));

        let record = f.ledger.find_by_event_id("evt_1").await.unwrap().unwrap();
        assert_eq!(record.result, WebhookDisposition::Success);
    }

    #[tokio::test]
    async fn replayed_event_is_a_no_op() {
        let f = fixture();
        let pending = insert_pending(&f, PlanTier::Tier2).await;
        let cmd = command("evt_1", charge_succeeded(pending.id, "ch_1"));
        f.handler.handle(cmd.clone()).await.unwrap();
        let published = f.bus.event_count();
        let stored = f.repo.find_by_id(&pending.id).await.unwrap().unwrap();

        let result = f.handler.handle(cmd).await.unwrap();

        assert!(matches!(result, HandlePaymentWebhookResult::Duplicate { .. }));
        assert_eq!(f.bus.event_count(), published);
        assert_eq!(f.repo.find_by_id(&pending.id).await.unwrap().unwrap(), stored);
    }

    #[tokio::test]
    async fn redelivery_under_new_event_id_does_not_reactivate() {
        let f = fixture();
        let pending = insert_pending(&f, PlanTier::Tier2).await;
        f.handler
            .handle(command("evt_1", charge_succeeded(pending.id, "ch_1")))
            .await
            .unwrap();

        let result = f
            .handler
            .handle(command("evt_2", charge_succeeded(pending.id, "ch_1")))
            .await
            .unwrap();

        assert!(matches!(result, HandlePaymentWebhookResult::Duplicate { .. }));
    }

    #[tokio::test]
    async fn charge_for_superseded_pending_is_rejected_and_recorded() {
        let f = fixture();
        let first = insert_pending(&f, PlanTier::Tier2).await;
        let mut expired = f.repo.find_by_id(&first.id).await.unwrap().unwrap();
        expired.expire(t0()).unwrap();
        f.repo.update(expired).await.unwrap();

        let result = f
            .handler
            .handle(command("evt_late", charge_succeeded(first.id, "ch_9")))
            .await;

        assert!(matches!(result, Err(SubscriptionError::InvalidState { .. })));
        let record = f.ledger.find_by_event_id("evt_late").await.unwrap().unwrap();
        assert_eq!(record.result, WebhookDisposition::Failed);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Charge Failed / Renewal / Other
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn failed_charge_keeps_record_pending() {
        let f = fixture();
        let pending = insert_pending(&f, PlanTier::Tier3).await;

        let result = f
            .handler
            .handle(command(
                "evt_f",
                PaymentEventKind::ChargeFailed {
                    subscription_id: pending.id,
                    reason: "card_declined".to_string(),
                },
            ))
            .await
            .unwrap();

        match result {
            HandlePaymentWebhookResult::ChargeFailed { reason, .. } => {
                assert_eq!(reason, "card_declined")
            }
            other => panic!("expected ChargeFailed, got {:?}", other),
        }
        let stored = f.repo.find_pending(&key()).await.unwrap().unwrap();
        assert_eq!(stored.id, pending.id);
        assert!(f.bus.has_event("subscription.charge_failed.v1"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_deliveries_of_one_failure_publish_once() {
        let f = fixture();
        let pending = insert_pending(&f, PlanTier::Tier2).await;
        let cmd = command(
            "evt_f",
            PaymentEventKind::ChargeFailed {
                subscription_id: pending.id,
                reason: "card_declined".to_string(),
            },
        );
        let handler = Arc::new(f.handler);

        let deliveries = (0..8).map(|_| {
            let handler = Arc::clone(&handler);
            let cmd = cmd.clone();
            tokio::spawn(async move { handler.handle(cmd).await })
        });
        let results: Vec<_> = futures::future::join_all(deliveries)
            .await
            .into_iter()
            .map(|joined| joined.unwrap().unwrap())
            .collect();

        let processed = results
            .iter()
            .filter(|r| matches!(r, HandlePaymentWebhookResult::ChargeFailed { .. }))
            .count();
        assert_eq!(processed, 1);
        assert_eq!(results.len() - processed, 7);
        assert!(results.iter().all(|r| matches!(
            r,
            HandlePaymentWebhookResult::ChargeFailed { .. } | HandlePaymentWebhookResult::Duplicate { .. }
        )));
        assert_eq!(f.bus.events_of_type("subscription.charge_failed.v1").len(), 1);
    }

    #[tokio::test]
    async fn renewal_payment_is_recorded_for_next_period() {
        let f = fixture();
        let pending = insert_pending(&f, PlanTier::Tier2).await;
        f.handler
            .handle(command("evt_1", charge_succeeded(pending.id, "ch_1")))
            .await
            .unwrap();
        f.clock.advance_days(29);

        let result = f
            .handler
            .handle(command(
                "evt_2",
                PaymentEventKind::RenewalPaid {
                    subscription_id: pending.id,
                    payment_reference: "in_2".to_string(),
                },
            ))
            .await
            .unwrap();

        let HandlePaymentWebhookResult::RenewalRecorded { subscription } = result else {
            panic!("expected renewal, got {:?}", result);
        };
        assert_eq!(subscription.next_period_payment_reference.as_deref(), Some("in_2"));
    }

    #[tokio::test]
    async fn late_renewal_rolls_period_forward() {
        let f = fixture();
        let pending = insert_pending(&f, PlanTier::Tier2).await;
        f.handler
            .handle(command("evt_1", charge_succeeded(pending.id, "ch_1")))
            .await
            .unwrap();
        f.clock.advance_days(31);

        let result = f
            .handler
            .handle(command(
                "evt_2",
                PaymentEventKind::RenewalPaid {
                    subscription_id: pending.id,
                    payment_reference: "in_2".to_string(),
                },
            ))
            .await
            .unwrap();

        let HandlePaymentWebhookResult::RenewalRecorded { subscription } = result else {
            panic!("expected renewal, got {:?}", result);
        };
        assert_eq!(subscription.payment_reference_id.as_deref(), Some("in_2"));
        assert!(subscription.next_period_payment_reference.is_none());
        assert!(f.bus.has_event("subscription.renewed.v1"));
    }

    #[tokio::test]
    async fn unknown_events_are_acknowledged() {
        let f = fixture();

        let result = f
            .handler
            .handle(command(
                "evt_u",
                PaymentEventKind::Unknown {
                    event_type: "customer.updated".to_string(),
                },
            ))
            .await
            .unwrap();

        assert!(matches!(result, HandlePaymentWebhookResult::Ignored { .. }));
        let record = f.ledger.find_by_event_id("evt_u").await.unwrap().unwrap();
        assert_eq!(record.result, WebhookDisposition::Ignored);
    }

    #[tokio::test]
    async fn unknown_subscription_is_ignored() {
        let f = fixture();

        let result = f
            .handler
            .handle(command("evt_x", charge_succeeded(SubscriptionId::new(), "ch_1")))
            .await
            .unwrap();

        assert!(matches!(result, HandlePaymentWebhookResult::Ignored { .. }));
    }

    #[tokio::test]
    async fn bad_signature_is_rejected_before_anything_else() {
        let f = fixture();
        let pending = insert_pending(&f, PlanTier::Tier2).await;
        f.gateway.reject_signatures(true);

        let result = f
            .handler
            .handle(command("evt_1", charge_succeeded(pending.id, "ch_1")))
            .await;

        assert!(matches!(result, Err(SubscriptionError::InvalidWebhook(_))));
        assert!(f.ledger.find_by_event_id("evt_1").await.unwrap().is_none());
        assert_eq!(
            f.repo.find_by_id(&pending.id).await.unwrap().unwrap().status,
            SubscriptionStatus::PendingPayment
        );
    }
}
