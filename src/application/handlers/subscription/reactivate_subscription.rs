//! ReactivateSubscriptionHandler - Withdraws a scheduled cancellation.

use std::sync::Arc;

use super::rollover::{publish_events, settle_record};
use crate::application::OwnerLocks;
use crate::domain::foundation::OwnerId;
use crate::domain::subscription::{
    AccountKind, Subscription, SubscriptionChange, SubscriptionError, SubscriptionEvent,
    SubscriptionKey,
};
use crate::ports::{Clock, EventPublisher, SubscriptionRepository};

/// Command to reactivate a cancelling subscription.
#[derive(Debug, Clone)]
pub struct ReactivateSubscriptionCommand {
    pub owner_id: OwnerId,
    pub account_kind: AccountKind,
}

#[derive(Debug, Clone)]
pub struct ReactivateSubscriptionResult {
    pub subscription: Subscription,
}

/// Handler for reactivation.
///
/// Once the period has ended the request is rejected with
/// `ReactivationWindowClosed` and the due rollover is applied.
pub struct ReactivateSubscriptionHandler {
    repository: Arc<dyn SubscriptionRepository>,
    event_publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    locks: Arc<OwnerLocks>,
}

impl ReactivateSubscriptionHandler {
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

    pub async fn handle(
        &self,
        cmd: ReactivateSubscriptionCommand,
    ) -> Result<ReactivateSubscriptionResult, SubscriptionError> {
        let key = SubscriptionKey::new(cmd.owner_id, cmd.account_kind);
        let _guard = self.locks.lock(&key).await;
        let now = self.clock.now();

        let current = self
            .repository
            .find_current(&key)
            .await?
            .ok_or_else(|| SubscriptionError::not_found(&key))?;

        let mut subscription = current.clone();
        if let Err(e) = subscription.reactivate(now) {
            tracing::warn!(
                subscription_id = %current.id,
                owner_id = %key.owner_id,
                account_kind = %key.account_kind,
                error = %e,
                "Reactivation rejected"
            );
            if matches!(e, SubscriptionError::ReactivationWindowClosed { .. }) {
                let settlement = settle_record(self.repository.as_ref(), current, now).await?;
                publish_events(self.event_publisher.as_ref(), settlement.events).await;
            }
            return Err(e);
        }

        let subscription = self.repository.update(subscription).await?;
        tracing::info!(
            subscription_id = %subscription.id,
            owner_id = %subscription.owner_id,
            account_kind = %subscription.account_kind,
            "Subscription reactivated"
        );

        let event = SubscriptionEvent::new(&subscription, SubscriptionChange::Reactivated, now);
        publish_events(self.event_publisher.as_ref(), vec![event]).await;

        Ok(ReactivateSubscriptionResult { subscription })
    }
}
