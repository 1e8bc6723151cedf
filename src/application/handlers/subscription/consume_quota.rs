//! ConsumeQuotaHandler - Spends one unit of the current period's quota.

use std::sync::Arc;

use super::rollover::{publish_events, settle_current};
use crate::application::OwnerLocks;
use crate::domain::foundation::OwnerId;
use crate::domain::subscription::{AccountKind, Subscription, SubscriptionError, SubscriptionKey};
use crate::ports::{Clock, EventPublisher, SubscriptionRepository};

#[derive(Debug, Clone)]
pub struct ConsumeQuotaCommand {
    pub owner_id: OwnerId,
    pub account_kind: AccountKind,
}

#[derive(Debug, Clone)]
pub struct ConsumeQuotaResult {
    /// False when the quota was already used up; nothing was written.
    pub consumed: bool,
    pub remaining: u32,
    pub subscription: Subscription,
}

pub struct ConsumeQuotaHandler {
    repository: Arc<dyn SubscriptionRepository>,
    event_publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    locks: Arc<OwnerLocks>,
}

impl ConsumeQuotaHandler {
    pub fn new(
        repository: Arc<dyn SubscriptionRepository>,
        event_publisher: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
        locks: Arc<OwnerLocks>,
    ) -> Self {
        Self {
            repository,
            event_publisher,
            clock,
            locks,
        }
    }

    pub async fn handle(&self, cmd: ConsumeQuotaCommand) -> Result<ConsumeQuotaResult, SubscriptionError> {
        let key = SubscriptionKey::new(cmd.owner_id, cmd.account_kind);
        let _guard = self.locks.lock(&key).await;
        let now = self.clock.now();

        // Usage always counts against the period that contains `now`
        let settlement = settle_current(self.repository.as_ref(), &key, now).await?;
        publish_events(self.event_publisher.as_ref(), settlement.events).await;
        let mut subscription = settlement
            .current
            .ok_or_else(|| SubscriptionError::not_found(&key))?;

        if !subscription.consume_unit(now)? {
            tracing::info!(
                subscription_id = %subscription.id,
                owner_id = %key.owner_id,
                account_kind = %key.account_kind,
                monthly_quota = subscription.quota.monthly_quota,
                "Quota exhausted"
            );
            return Ok(ConsumeQuotaResult {
                consumed: false,
                remaining: 0,
                subscription,
            });
        }

        let subscription = self.repository.update(subscription).await?;
        tracing::debug!(
            subscription_id = %subscription.id,
            quota_used = subscription.quota.quota_used,
            "Quota unit consumed"
        );

        Ok(ConsumeQuotaResult {
            consumed: true,
            remaining: subscription.remaining_quota(),
            subscription,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::events::InMemoryEventBus;
    use crate::adapters::memory::InMemorySubscriptionRepository;
    use crate::domain::foundation::Timestamp;
    use crate::domain::subscription::{PlanCatalog, PlanTier, UNLIMITED_QUOTA};
    use crate::ports::FixedClock;

    fn t0() -> Timestamp {
        Timestamp::from_unix_secs(1_717_200_000).unwrap()
    }

    fn owner() -> OwnerId {
        OwnerId::new("biz-1").unwrap()
    }

    fn command() -> ConsumeQuotaCommand {
        ConsumeQuotaCommand {
            owner_id: owner(),
            account_kind: AccountKind::Business,
        }
    }

    fn handler(repo: Arc<InMemorySubscriptionRepository>, clock: Arc<FixedClock>) -> ConsumeQuotaHandler {
        ConsumeQuotaHandler::new(
            repo,
            Arc::new(InMemoryEventBus::new()),
            clock,
            Arc::new(OwnerLocks::new()),
        )
    }

    #[tokio::test]
    async fn consumes_until_limit_then_refuses_without_writing() {
        let repo = Arc::new(InMemorySubscriptionRepository::new());
        let clock = Arc::new(FixedClock::new(t0()));
        repo.insert(Subscription::create_free(owner(), AccountKind::Business, false, t0()))
            .await
            .unwrap();
        let handler = handler(repo.clone(), clock);

        for expected_remaining in (0..10).rev() {
            let result = handler.handle(command()).await.unwrap();
            assert!(result.consumed);
            assert_eq!(result.remaining, expected_remaining);
        }

        let refused = handler.handle(command()).await.unwrap();
        assert!(!refused.consumed);
        assert_eq!(refused.subscription.quota.quota_used, 10);
        let stored = repo.find_current(&refused.subscription.key()).await.unwrap().unwrap();
        assert_eq!(stored.version, refused.subscription.version);
    }

    #[tokio::test]
    async fn quota_resets_after_period_rollover() {
        let repo = Arc::new(InMemorySubscriptionRepository::new());
        let clock = Arc::new(FixedClock::new(t0()));
        let mut free = Subscription::create_free(owner(), AccountKind::Business, false, t0());
        for _ in 0..10 {
            free.consume_unit(t0()).unwrap();
        }
        repo.insert(free).await.unwrap();
        let handler = handler(repo, clock.clone());

        clock.advance_days(31);
        let result = handler.handle(command()).await.unwrap();

        assert!(result.consumed);
        assert_eq!(result.subscription.quota.quota_used, 1);
    }

    #[tokio::test]
    async fn unlimited_plan_never_runs_out() {
        let repo = Arc::new(InMemorySubscriptionRepository::new());
        let clock = Arc::new(FixedClock::new(t0()));
        let plan = PlanCatalog::lookup(AccountKind::Business, PlanTier::Tier3).unwrap();
        let mut sub = Subscription::create_pending(owner(), &plan, plan.base_price, false, t0());
        sub.activate("ch_1", t0()).unwrap();
        repo.insert(sub).await.unwrap();
        let handler = handler(repo, clock);

        let result = handler.handle(command()).await.unwrap();

        assert!(result.consumed);
        assert_eq!(result.remaining, UNLIMITED_QUOTA - 1);
    }

    #[tokio::test]
    async fn without_subscription_is_not_found() {
        let repo = Arc::new(InMemorySubscriptionRepository::new());
        let clock = Arc::new(FixedClock::new(t0()));
        let result = handler(repo, clock).handle(command()).await;
        assert!(matches!(result, Err(SubscriptionError::NotFound(_))));
    }
}
