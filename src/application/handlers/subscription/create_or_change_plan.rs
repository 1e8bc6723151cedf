//! CreateOrChangePlanHandler - Command handler for selecting a plan tier.
//!
//! Free plans take effect immediately and supersede whatever the owner had.
//! Paid plans create a pending record that the payment webhook activates.

use std::sync::Arc;

use super::rollover::{publish_events, settle_current};
use crate::application::OwnerLocks;
use crate::domain::foundation::OwnerId;
use crate::domain::subscription::{
    AccountKind, ExpiredReason, FounderGrant, FounderPricing, PlanCatalog, PlanTier,
    Subscription, SubscriptionError, SubscriptionEvent, SubscriptionKey, SubscriptionStatus,
};
use crate::ports::{Clock, EventPublisher, FounderAllocator, SubscriptionRepository, SubscriptionWrite};

/// Command to select a plan.
#[derive(Debug, Clone)]
pub struct CreateOrChangePlanCommand {
    pub owner_id: OwnerId,
    pub account_kind: AccountKind,
    pub tier: PlanTier,
}

/// Result of a plan selection.
#[derive(Debug, Clone)]
pub struct CreateOrChangePlanResult {
    /// The new record: active for free plans, pending payment otherwise.
    pub subscription: Subscription,
    /// Records expired by this selection.
    pub superseded: Vec<Subscription>,
    /// Founder allocation outcome; `None` for free plans.
    pub founder_grant: Option<FounderGrant>,
}

/// Handler for plan selection.
pub struct CreateOrChangePlanHandler {
    repository: Arc<dyn SubscriptionRepository>,
    founders: Arc<dyn FounderAllocator>,
    event_publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    locks: Arc<OwnerLocks>,
    pricing: FounderPricing,
}

impl CreateOrChangePlanHandler {
    pub fn new(
        repository: Arc<dyn SubscriptionRepository>,
        founders: Arc<dyn FounderAllocator>,
        event_publisher: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
        locks: Arc<OwnerLocks>,
        pricing: FounderPricing,
    ) -> Self {
        Self {
            repository,
            founders,
            event_publisher,
            clock,
            locks,
            pricing,
        }
    }

    pub async fn handle(
        &self,
        cmd: CreateOrChangePlanCommand,
    ) -> Result<CreateOrChangePlanResult, SubscriptionError> {
        // 1. Resolve the plan before touching any state
        let plan = PlanCatalog::lookup(cmd.account_kind, cmd.tier)?;
        let key = SubscriptionKey::new(cmd.owner_id.clone(), cmd.account_kind);

        let _guard = self.locks.lock(&key).await;
        let now = self.clock.now();

        // 2. Bring the current record up to date
        let settlement = settle_current(self.repository.as_ref(), &key, now).await?;
        publish_events(self.event_publisher.as_ref(), settlement.events).await;
        let current = settlement.current;

        if let Some(existing) = &current {
            if existing.tier == cmd.tier && existing.status == SubscriptionStatus::Active {
                tracing::warn!(
                    owner_id = %key.owner_id,
                    account_kind = %key.account_kind,
                    tier = %cmd.tier,
                    "Plan selection rejected: already on tier"
                );
                return Err(SubscriptionError::AlreadySubscribed(cmd.tier));
            }
        }

        let pending = self.repository.find_pending(&key).await?;

        // 3. Build the new record
        let (subscription, founder_grant) = if plan.is_free() {
            let is_founder = self
                .founders
                .is_founder(cmd.account_kind, &cmd.owner_id)
                .await?;
            let free = Subscription::create_free(cmd.owner_id, cmd.account_kind, is_founder, now);
            (free, None)
        } else {
            let grant = self
                .founders
                .try_grant_founder_status(cmd.account_kind, &cmd.owner_id)
                .await?;
            let price = self.pricing.price_for(&plan, grant.is_founder());
            let pending = Subscription::create_pending(
                cmd.owner_id,
                &plan,
                price,
                grant.is_founder(),
                now,
            );
            (pending, Some(grant))
        };

        // 4. Expire what the new record replaces
        let mut writes = Vec::new();
        let mut events = Vec::new();

        if plan.is_free() {
            if let Some(mut old) = current {
                old.supersede(subscription.id, now)?;
                events.push(SubscriptionEvent::expired(&old, ExpiredReason::Superseded, now));
                writes.push(SubscriptionWrite::Update(old));
            }
        }
        if let Some(mut old) = pending {
            old.supersede(subscription.id, now)?;
            events.push(SubscriptionEvent::expired(&old, ExpiredReason::Superseded, now));
            writes.push(SubscriptionWrite::Update(old));
        }
        events.push(SubscriptionEvent::created(&subscription));
        writes.push(SubscriptionWrite::Insert(subscription));

        // 5. Commit as one batch
        let mut committed = self.repository.apply(writes).await?;
        let subscription = committed
            .pop()
            .ok_or_else(|| SubscriptionError::infrastructure("Repository returned an empty batch"))?;

        tracing::info!(
            subscription_id = %subscription.id,
            owner_id = %subscription.owner_id,
            account_kind = %subscription.account_kind,
            tier = %subscription.tier,
            status = %subscription.status,
            price = %subscription.price,
            founder = subscription.has_founder_discount,
            "Plan selected"
        );

        publish_events(self.event_publisher.as_ref(), events).await;

        Ok(CreateOrChangePlanResult {
            subscription,
            superseded: committed,
            founder_grant,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::events::InMemoryEventBus;
    use crate::adapters::memory::{InMemoryFounderAllocator, InMemorySubscriptionRepository};
    use crate::domain::foundation::{Money, Timestamp};
    use crate::ports::FixedClock;

    struct Fixture {
        repo: Arc<InMemorySubscriptionRepository>,
        founders: Arc<InMemoryFounderAllocator>,
        bus: Arc<InMemoryEventBus>,
        clock: Arc<FixedClock>,
        handler: CreateOrChangePlanHandler,
    }

    fn t0() -> Timestamp {
        Timestamp::from_unix_secs(1_717_200_000).unwrap()
    }

    fn fixture_with_limit(limit: u32) -> Fixture {
        let repo = Arc::new(InMemorySubscriptionRepository::new());
        let founders = Arc::new(InMemoryFounderAllocator::with_limit(limit));
        let bus = Arc::new(InMemoryEventBus::new());
        let clock = Arc::new(FixedClock::new(t0()));
        let handler = CreateOrChangePlanHandler::new(
            repo.clone(),
            founders.clone(),
            bus.clone(),
            clock.clone(),
            Arc::new(OwnerLocks::new()),
            FounderPricing::default(),
        );
        Fixture {
            repo,
            founders,
            bus,
            clock,
            handler,
        }
    }

    fn fixture() -> Fixture {
        fixture_with_limit(1000)
    }

    fn select(owner: &str, kind: AccountKind, tier: PlanTier) -> CreateOrChangePlanCommand {
        CreateOrChangePlanCommand {
            owner_id: OwnerId::new(owner).unwrap(),
            account_kind: kind,
            tier,
        }
    }

    fn key(owner: &str, kind: AccountKind) -> SubscriptionKey {
        SubscriptionKey::new(OwnerId::new(owner).unwrap(), kind)
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Success Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn free_plan_is_active_immediately() {
        let f = fixture();

        let result = f
            .handler
            .handle(select("pro-1", AccountKind::Professional, PlanTier::Free))
            .await
            .unwrap();

        assert_eq!(result.subscription.status, SubscriptionStatus::Active);
        assert_eq!(result.subscription.price, Money::ZERO);
        assert_eq!(result.subscription.quota.monthly_quota, 5);
        assert!(result.founder_grant.is_none());
        assert!(f.bus.has_event("subscription.created.v1"));
    }

    #[tokio::test]
    async fn paid_plan_starts_pending_with_founder_price() {
        let f = fixture();

        let result = f
            .handler
            .handle(select("pro-1", AccountKind::Professional, PlanTier::Tier2))
            .await
            .unwrap();

        assert_eq!(result.subscription.status, SubscriptionStatus::PendingPayment);
        assert_eq!(result.subscription.price, Money::from_minor(799));
        assert!(result.subscription.has_founder_discount);
        assert_eq!(result.founder_grant, Some(FounderGrant::Granted { ordinal: 1 }));
    }

    #[tokio::test]
    async fn exhausted_founder_program_charges_full_price() {
        let f = fixture_with_limit(1);
        f.handler
            .handle(select("pro-1", AccountKind::Professional, PlanTier::Tier2))
            .await
            .unwrap();

        let result = f
            .handler
            .handle(select("pro-2", AccountKind::Professional, PlanTier::Tier2))
            .await
            .unwrap();

        assert_eq!(result.subscription.price, Money::from_minor(999));
        assert!(!result.subscription.has_founder_discount);
        assert_eq!(result.founder_grant, Some(FounderGrant::Exhausted));
    }

    #[tokio::test]
    async fn free_plan_supersedes_paid_subscription_without_refund() {
        let f = fixture();
        let plan = PlanCatalog::lookup(AccountKind::Professional, PlanTier::Tier3).unwrap();
        let mut paid = Subscription::create_pending(
            OwnerId::new("pro-1").unwrap(),
            &plan,
            plan.base_price,
            false,
            t0(),
        );
        paid.activate("ch_1", t0()).unwrap();
        let paid = f.repo.insert(paid).await.unwrap();
        f.clock.advance_days(3);

        let result = f
            .handler
            .handle(select("pro-1", AccountKind::Professional, PlanTier::Free))
            .await
            .unwrap();

        assert_eq!(result.superseded.len(), 1);
        assert_eq!(result.superseded[0].id, paid.id);
        assert_eq!(result.superseded[0].status, SubscriptionStatus::Expired);
        assert_eq!(result.superseded[0].superseded_by, Some(result.subscription.id));
        let current = f
            .repo
            .find_current(&key("pro-1", AccountKind::Professional))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(current.id, result.subscription.id);
    }

    #[tokio::test]
    async fn paid_selection_keeps_current_until_payment() {
        let f = fixture();
        let free = f
            .handler
            .handle(select("biz-1", AccountKind::Business, PlanTier::Tier1))
            .await
            .unwrap()
            .subscription;

        let result = f
            .handler
            .handle(select("biz-1", AccountKind::Business, PlanTier::Tier2))
            .await
            .unwrap();

        assert!(result.superseded.is_empty());
        let k = key("biz-1", AccountKind::Business);
        assert_eq!(f.repo.find_current(&k).await.unwrap().unwrap().id, free.id);
        assert_eq!(
            f.repo.find_pending(&k).await.unwrap().unwrap().id,
            result.subscription.id
        );
    }

    #[tokio::test]
    async fn new_selection_expires_older_pending_record() {
        let f = fixture();
        let first = f
            .handler
            .handle(select("pro-1", AccountKind::Professional, PlanTier::Tier2))
            .await
            .unwrap()
            .subscription;

        let second = f
            .handler
            .handle(select("pro-1", AccountKind::Professional, PlanTier::Tier3))
            .await
            .unwrap();

        assert_eq!(second.superseded.len(), 1);
        assert_eq!(second.superseded[0].id, first.id);
        assert_eq!(
            second.founder_grant,
            Some(FounderGrant::AlreadyHeld),
            "founder grant is not counted twice"
        );
        assert_eq!(
            f.founders.snapshot(AccountKind::Professional).await.unwrap().count,
            1
        );
    }

    #[tokio::test]
    async fn founder_keeps_flag_on_free_plan() {
        let f = fixture();
        f.handler
            .handle(select("pro-1", AccountKind::Professional, PlanTier::Tier2))
            .await
            .unwrap();

        let free = f
            .handler
            .handle(select("pro-1", AccountKind::Professional, PlanTier::Free))
            .await
            .unwrap()
            .subscription;

        assert!(free.has_founder_discount);
    }

    #[tokio::test]
    async fn cancelling_owner_may_reselect_same_tier() {
        let f = fixture();
        let plan = PlanCatalog::lookup(AccountKind::Professional, PlanTier::Tier2).unwrap();
        let mut sub = Subscription::create_pending(
            OwnerId::new("pro-1").unwrap(),
            &plan,
            plan.base_price,
            false,
            t0(),
        );
        sub.activate("ch_1", t0()).unwrap();
        sub.schedule_cancellation(t0()).unwrap();
        f.repo.insert(sub).await.unwrap();

        let result = f
            .handler
            .handle(select("pro-1", AccountKind::Professional, PlanTier::Tier2))
            .await;

        assert!(result.is_ok());
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Rejection Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn rejects_unknown_tier() {
        let f = fixture();
        let result = f
            .handler
            .handle(select("pro-1", AccountKind::Professional, PlanTier::Tier1))
            .await;
        assert!(matches!(result, Err(SubscriptionError::UnknownTier { .. })));
        assert!(f.repo.is_empty().await);
    }

    #[tokio::test]
    async fn rejects_same_active_tier() {
        let f = fixture();
        f.handler
            .handle(select("pro-1", AccountKind::Professional, PlanTier::Free))
            .await
            .unwrap();

        let result = f
            .handler
            .handle(select("pro-1", AccountKind::Professional, PlanTier::Free))
            .await;

        assert_eq!(result.unwrap_err(), SubscriptionError::AlreadySubscribed(PlanTier::Free));
        assert_eq!(f.repo.len().await, 1);
    }

    #[tokio::test]
    async fn publish_failure_does_not_fail_selection() {
        let f = fixture();
        f.bus.set_failing(true);

        let result = f
            .handler
            .handle(select("pro-1", AccountKind::Professional, PlanTier::Free))
            .await;

        assert!(result.is_ok());
        assert_eq!(f.repo.len().await, 1);
    }
}
