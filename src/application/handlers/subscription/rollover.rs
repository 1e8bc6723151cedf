//! Period rollover applied lazily on every read or use, and by the sweep.

use crate::domain::foundation::{SerializableDomainEvent, Timestamp};
use crate::domain::subscription::{
    ExpiredReason, RolloverOutcome, Subscription, SubscriptionChange, SubscriptionError,
    SubscriptionEvent, SubscriptionKey,
};
use crate::ports::{EventPublisher, SubscriptionRepository, SubscriptionWrite};

/// What settling did to the owner's current record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    /// Nothing was due.
    Unchanged,
    /// Period rolled forward.
    Renewed { periods: u32 },
    /// Benefits ended and a free-tier record replaced the old one.
    Downgraded { reason: ExpiredReason },
}

/// The owner's current record after rollover, plus what happened.
#[derive(Debug, Clone)]
pub struct Settlement {
    pub current: Option<Subscription>,
    pub outcome: SettleOutcome,
    pub events: Vec<SubscriptionEvent>,
}

/// Applies any due rollover to the current record of `key`.
///
/// Callers hold the owner lock. Events are returned, not published.
pub async fn settle_current(
    repository: &dyn SubscriptionRepository,
    key: &SubscriptionKey,
    now: Timestamp,
) -> Result<Settlement, SubscriptionError> {
    let current = repository.find_current(key).await?;
    match current {
        Some(sub) if sub.is_due_for_rollover(now) => settle_record(repository, sub, now).await,
        current => Ok(Settlement {
            current,
            outcome: SettleOutcome::Unchanged,
            events: Vec::new(),
        }),
    }
}

/// Applies any due rollover to `subscription`, already loaded by the caller.
pub async fn settle_record(
    repository: &dyn SubscriptionRepository,
    mut subscription: Subscription,
    now: Timestamp,
) -> Result<Settlement, SubscriptionError> {
    let mut events = Vec::new();
    let mut renewed_periods = 0;

    let lapse = loop {
        let period_start = subscription.current_period_start;
        match subscription.roll_over(now) {
            RolloverOutcome::NotDue => break None,
            RolloverOutcome::Renewed { periods } => {
                renewed_periods += periods;
                events.push(SubscriptionEvent::new(
                    &subscription,
                    SubscriptionChange::Renewed {
                        period_start: subscription.current_period_start,
                        period_end: subscription.current_period_end,
                        periods,
                    },
                    now,
                ));
                tracing::debug!(
                    subscription_id = %subscription.id,
                    from = %period_start,
                    periods,
                    "Subscription period rolled forward"
                );
            }
            RolloverOutcome::Lapsed { reason } => break Some(reason),
        }
    };

    let Some(reason) = lapse else {
        let committed = repository.update(subscription).await?;
        tracing::info!(
            subscription_id = %committed.id,
            owner_id = %committed.owner_id,
            account_kind = %committed.account_kind,
            periods = renewed_periods,
            "Subscription renewed"
        );
        return Ok(Settlement {
            current: Some(committed),
            outcome: SettleOutcome::Renewed {
                periods: renewed_periods,
            },
            events,
        });
    };

    let replacement = replace_with_free(repository, subscription, reason, now).await?;
    events.extend(replacement.events);
    tracing::info!(
        subscription_id = %replacement.free.id,
        owner_id = %replacement.free.owner_id,
        account_kind = %replacement.free.account_kind,
        reason = %reason,
        "Subscription lapsed to free tier"
    );

    Ok(Settlement {
        current: Some(replacement.free),
        outcome: SettleOutcome::Downgraded { reason },
        events,
    })
}

/// An ended record and the free-tier record that took its place.
#[derive(Debug, Clone)]
pub struct Replacement {
    pub expired: Subscription,
    pub free: Subscription,
    pub events: Vec<SubscriptionEvent>,
}

/// Expires `subscription` and inserts a free-tier successor starting at `now`,
/// in one batch. The successor keeps the founder flag.
pub async fn replace_with_free(
    repository: &dyn SubscriptionRepository,
    mut subscription: Subscription,
    reason: ExpiredReason,
    now: Timestamp,
) -> Result<Replacement, SubscriptionError> {
    let successor = Subscription::create_free(
        subscription.owner_id.clone(),
        subscription.account_kind,
        subscription.has_founder_discount,
        now,
    );
    subscription.supersede(successor.id, now)?;
    let events = vec![
        SubscriptionEvent::expired(&subscription, reason, now),
        SubscriptionEvent::created(&successor),
    ];

    let mut committed = repository
        .apply(vec![
            SubscriptionWrite::Update(subscription),
            SubscriptionWrite::Insert(successor),
        ])
        .await?
        .into_iter();

    match (committed.next(), committed.next()) {
        (Some(expired), Some(free)) => Ok(Replacement {
            expired,
            free,
            events,
        }),
        _ => Err(SubscriptionError::infrastructure(
            "Repository returned an incomplete batch",
        )),
    }
}

/// Publishes committed events. Failures are logged, never returned: the
/// state change already happened.
pub async fn publish_events(publisher: &dyn EventPublisher, events: Vec<SubscriptionEvent>) {
    if events.is_empty() {
        return;
    }

    let mut envelopes = Vec::with_capacity(events.len());
    for event in &events {
        match event.to_envelope() {
            Ok(envelope) => envelopes.push(envelope.with_owner_id(event.owner_id.as_str())),
            Err(e) => tracing::error!(
                error = %e,
                subscription_id = %event.subscription_id,
                "Failed to serialize subscription event"
            ),
        }
    }

    if let Err(e) = publisher.publish_all(envelopes).await {
        tracing::warn!(error = %e, count = events.len(), "Failed to publish subscription events");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemorySubscriptionRepository;
    use crate::domain::foundation::OwnerId;
    use crate::domain::subscription::{AccountKind, PlanCatalog, PlanTier, SubscriptionStatus};

    fn t0() -> Timestamp {
        Timestamp::from_unix_secs(1_717_200_000).unwrap()
    }

    fn owner() -> OwnerId {
        OwnerId::new("pro-1").unwrap()
    }

    fn key() -> SubscriptionKey {
        SubscriptionKey::new(owner(), AccountKind::Professional)
    }

    async fn active_paid(repo: &InMemorySubscriptionRepository) -> Subscription {
        let plan = PlanCatalog::lookup(AccountKind::Professional, PlanTier::Tier2).unwrap();
        let mut sub = Subscription::create_pending(owner(), &plan, plan.base_price, true, t0());
        sub.activate("ch_1", t0()).unwrap();
        repo.insert(sub).await.unwrap()
    }

    #[tokio::test]
    async fn nothing_due_leaves_record_alone() {
        let repo = InMemorySubscriptionRepository::new();
        let stored = active_paid(&repo).await;

        let settled = settle_current(&repo, &key(), t0().add_days(3)).await.unwrap();

        assert_eq!(settled.outcome, SettleOutcome::Unchanged);
        assert_eq!(settled.current.unwrap().version, stored.version);
        assert!(settled.events.is_empty());
    }

    #[tokio::test]
    async fn no_record_settles_to_none() {
        let repo = InMemorySubscriptionRepository::new();
        let settled = settle_current(&repo, &key(), t0()).await.unwrap();
        assert!(settled.current.is_none());
    }

    #[tokio::test]
    async fn free_plan_renews_across_several_periods() {
        let repo = InMemorySubscriptionRepository::new();
        let mut free = Subscription::create_free(owner(), AccountKind::Professional, false, t0());
        free.consume_unit(t0()).unwrap();
        repo.insert(free).await.unwrap();

        let settled = settle_current(&repo, &key(), t0().add_days(95)).await.unwrap();

        assert_eq!(settled.outcome, SettleOutcome::Renewed { periods: 3 });
        let current = settled.current.unwrap();
        assert_eq!(current.quota.quota_used, 0);
        assert!(current.current_period_end > t0().add_days(95));
    }

    #[tokio::test]
    async fn confirmed_renewal_rolls_paid_plan_forward() {
        let repo = InMemorySubscriptionRepository::new();
        let mut sub = active_paid(&repo).await;
        sub.record_renewal_payment("in_2", t0().add_days(29)).unwrap();
        let sub = repo.update(sub).await.unwrap();

        let settled = settle_current(&repo, &key(), t0().add_days(31)).await.unwrap();

        assert_eq!(settled.outcome, SettleOutcome::Renewed { periods: 1 });
        let current = settled.current.unwrap();
        assert_eq!(current.id, sub.id);
        assert_eq!(current.payment_reference_id.as_deref(), Some("in_2"));
        assert!(current.next_period_payment_reference.is_none());
        assert_eq!(settled.events.len(), 1);
    }

    #[tokio::test]
    async fn unpaid_renewal_downgrades_to_free() {
        let repo = InMemorySubscriptionRepository::new();
        let mut sub = active_paid(&repo).await;
        sub.consume_unit(t0()).unwrap();
        let sub = repo.update(sub).await.unwrap();

        let now = t0().add_days(31);
        let settled = settle_current(&repo, &key(), now).await.unwrap();

        assert_eq!(
            settled.outcome,
            SettleOutcome::Downgraded {
                reason: ExpiredReason::UnpaidRenewal
            }
        );
        let free = settled.current.unwrap();
        assert_eq!(free.tier, PlanTier::Free);
        assert_eq!(free.quota.quota_used, 0);
        assert_eq!(free.quota.monthly_quota, 5);
        assert!(free.has_founder_discount);
        assert_eq!(free.current_period_start, now);

        let old = repo.find_by_id(&sub.id).await.unwrap().unwrap();
        assert_eq!(old.status, SubscriptionStatus::Expired);
        assert_eq!(old.superseded_by, Some(free.id));
    }

    #[tokio::test]
    async fn renewed_then_lapsed_emits_both() {
        let repo = InMemorySubscriptionRepository::new();
        let mut sub = active_paid(&repo).await;
        sub.record_renewal_payment("in_2", t0()).unwrap();
        repo.update(sub).await.unwrap();

        let settled = settle_current(&repo, &key(), t0().add_days(65)).await.unwrap();

        assert!(matches!(settled.outcome, SettleOutcome::Downgraded { .. }));
        let types: Vec<_> = settled
            .events
            .iter()
            .map(|e| e.change.clone())
            .collect();
        assert!(matches!(types[0], SubscriptionChange::Renewed { .. }));
        assert!(matches!(types[1], SubscriptionChange::Expired { .. }));
        assert!(matches!(types[2], SubscriptionChange::Created { .. }));
    }
}
