//! RolloverSweepHandler - Periodic pass applying due period rollovers.
//!
//! Reads and writes already settle lazily; the sweep makes sure owners who
//! never come back still get downgraded and their quota reset.

use std::sync::Arc;

use futures::stream::{self, StreamExt};

use super::rollover::{publish_events, settle_current, SettleOutcome};
use crate::application::OwnerLocks;
use crate::domain::foundation::Timestamp;
use crate::domain::subscription::{SubscriptionError, SubscriptionKey};
use crate::ports::{Clock, EventPublisher, SubscriptionRepository};

#[derive(Debug, Clone, Copy)]
pub struct RolloverSweepCommand {
    /// Most records examined in this pass.
    pub batch_size: usize,
}

/// Counts for one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RolloverSweepResult {
    pub examined: usize,
    pub renewed: usize,
    pub downgraded: usize,
    pub failed: usize,
}

pub struct RolloverSweepHandler {
    repository: Arc<dyn SubscriptionRepository>,
    event_publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    locks: Arc<OwnerLocks>,
    concurrency: usize,
}

impl RolloverSweepHandler {
    pub fn new(
        repository: Arc<dyn SubscriptionRepository>,
        event_publisher: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
        locks: Arc<OwnerLocks>,
        concurrency: usize,
    ) -> Self {
        Self {
            repository,
            event_publisher,
            clock,
            locks,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn handle(&self, cmd: RolloverSweepCommand) -> Result<RolloverSweepResult, SubscriptionError> {
        let now = self.clock.now();
        let due = self
            .repository
            .find_due_for_rollover(now, cmd.batch_size)
            .await?;

        let mut result = RolloverSweepResult {
            examined: due.len(),
            ..Default::default()
        };
        if due.is_empty() {
            return Ok(result);
        }

        let outcomes: Vec<_> = stream::iter(due.into_iter().map(|sub| sub.key()))
            .map(|key| self.settle_one(key, now))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                Ok(SettleOutcome::Renewed { .. }) => result.renewed += 1,
                Ok(SettleOutcome::Downgraded { .. }) => result.downgraded += 1,
                // Someone else settled it first
                Ok(SettleOutcome::Unchanged) => {}
                Err(_) => result.failed += 1,
            }
        }

        tracing::info!(
            examined = result.examined,
            renewed = result.renewed,
            downgraded = result.downgraded,
            failed = result.failed,
            "Rollover sweep finished"
        );
        Ok(result)
    }

    async fn settle_one(
        &self,
        key: SubscriptionKey,
        now: Timestamp,
    ) -> Result<SettleOutcome, SubscriptionError> {
        let _guard = self.locks.lock(&key).await;
        match settle_current(self.repository.as_ref(), &key, now).await {
            Ok(settlement) => {
                publish_events(self.event_publisher.as_ref(), settlement.events).await;
                Ok(settlement.outcome)
            }
            Err(e) => {
                tracing::error!(
                    owner_id = %key.owner_id,
                    account_kind = %key.account_kind,
                    error = %e,
                    "Rollover failed"
                );
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::events::InMemoryEventBus;
    use crate::adapters::memory::InMemorySubscriptionRepository;
    use crate::domain::foundation::OwnerId;
    use crate::domain::subscription::{AccountKind, PlanCatalog, PlanTier, Subscription};
    use crate::ports::FixedClock;

    fn t0() -> Timestamp {
        Timestamp::from_unix_secs(1_717_200_000).unwrap()
    }

    async fn seed(repo: &InMemorySubscriptionRepository) {
        // Two free owners renew, two unpaid paid owners lapse, one is not due
        for n in 0..2 {
            repo.insert(Subscription::create_free(
                OwnerId::new(format!("free-{}", n)).unwrap(),
                AccountKind::Professional,
                false,
                t0(),
            ))
            .await
            .unwrap();
        }
        let plan = PlanCatalog::lookup(AccountKind::Business, PlanTier::Tier2).unwrap();
        for n in 0..2 {
            let mut sub = Subscription::create_pending(
                OwnerId::new(format!("paid-{}", n)).unwrap(),
                &plan,
                plan.base_price,
                false,
                t0(),
            );
            sub.activate("ch_1", t0()).unwrap();
            repo.insert(sub).await.unwrap();
        }
        repo.insert(Subscription::create_free(
            OwnerId::new("late").unwrap(),
            AccountKind::Business,
            false,
            t0().add_days(20),
        ))
        .await
        .unwrap();
    }

    fn handler(repo: Arc<InMemorySubscriptionRepository>, bus: Arc<InMemoryEventBus>) -> RolloverSweepHandler {
        RolloverSweepHandler::new(
            repo,
            bus,
            Arc::new(FixedClock::new(t0().add_days(35))),
            Arc::new(OwnerLocks::new()),
            4,
        )
    }

    #[tokio::test]
    async fn sweep_counts_renewals_and_downgrades() {
        let repo = Arc::new(InMemorySubscriptionRepository::new());
        let bus = Arc::new(InMemoryEventBus::new());
        seed(&repo).await;

        let result = handler(repo.clone(), bus.clone())
            .handle(RolloverSweepCommand { batch_size: 100 })
            .await
            .unwrap();

        assert_eq!(
            result,
            RolloverSweepResult {
                examined: 4,
                renewed: 2,
                downgraded: 2,
                failed: 0
            }
        );
        assert_eq!(bus.events_of_type("subscription.expired.v1").len(), 2);

        let again = handler(repo, bus)
            .handle(RolloverSweepCommand { batch_size: 100 })
            .await
            .unwrap();
        assert_eq!(again, RolloverSweepResult::default());
    }

    #[tokio::test]
    async fn batch_size_limits_work_per_pass() {
        let repo = Arc::new(InMemorySubscriptionRepository::new());
        seed(&repo).await;

        let result = handler(repo, Arc::new(InMemoryEventBus::new()))
            .handle(RolloverSweepCommand { batch_size: 3 })
            .await
            .unwrap();

        assert_eq!(result.examined, 3);
    }
}
