//! GetSubscriptionHandler - Query for an owner's subscription state.
//!
//! Reads apply any due rollover first, so callers never see a stale period.

use std::sync::Arc;

use super::rollover::{publish_events, settle_current};
use crate::application::OwnerLocks;
use crate::domain::foundation::OwnerId;
use crate::domain::subscription::{AccountKind, Subscription, SubscriptionError, SubscriptionKey};
use crate::ports::{Clock, EventPublisher, SubscriptionRepository};

#[derive(Debug, Clone)]
pub struct GetSubscriptionQuery {
    pub owner_id: OwnerId,
    pub account_kind: AccountKind,
}

#[derive(Debug, Clone)]
pub struct GetSubscriptionResult {
    /// Active or cancelling record.
    pub current: Option<Subscription>,
    /// Paid selection awaiting its first charge.
    pub pending: Option<Subscription>,
    /// Units left this period; 0 without a current record.
    pub remaining_quota: u32,
}

pub struct GetSubscriptionHandler {
    repository: Arc<dyn SubscriptionRepository>,
    event_publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    locks: Arc<OwnerLocks>,
}

impl GetSubscriptionHandler {
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

    pub async fn handle(&self, query: GetSubscriptionQuery) -> Result<GetSubscriptionResult, SubscriptionError> {
        let key = SubscriptionKey::new(query.owner_id, query.account_kind);
        let _guard = self.locks.lock(&key).await;

        let settlement = settle_current(self.repository.as_ref(), &key, self.clock.now()).await?;
        publish_events(self.event_publisher.as_ref(), settlement.events).await;
        let pending = self.repository.find_pending(&key).await?;

        let remaining_quota = settlement
            .current
            .as_ref()
            .map(Subscription::remaining_quota)
            .unwrap_or(0);

        Ok(GetSubscriptionResult {
            current: settlement.current,
            pending,
            remaining_quota,
        })
    }
}
