//! In-memory implementation of SubscriptionRepository.
//!
//! Enforces the same rules as the PostgreSQL adapter (version compare-and-set,
//! one benefit-bearing and one pending record per owner+kind) under a single
//! write lock, so batches are atomic.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::foundation::{DomainError, ErrorCode, SubscriptionId, Timestamp};
use crate::domain::subscription::{Subscription, SubscriptionKey, SubscriptionStatus};
use crate::ports::{SubscriptionRepository, SubscriptionWrite};

/// In-memory subscription store for tests and single-process deployments.
#[derive(Debug, Default, Clone)]
pub struct InMemorySubscriptionRepository {
    records: Arc<RwLock<HashMap<SubscriptionId, Subscription>>>,
}

impl InMemorySubscriptionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, in any status.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

fn check_uniqueness(
    records: &HashMap<SubscriptionId, Subscription>,
    staged: &HashMap<SubscriptionId, Subscription>,
    keys: &HashSet<SubscriptionKey>,
) -> Result<(), DomainError> {
    for key in keys {
        let merged = records
            .iter()
            .filter(|(id, _)| !staged.contains_key(id))
            .map(|(_, s)| s)
            .chain(staged.values())
            .filter(|s| s.owner_id == key.owner_id && s.account_kind == key.account_kind);

        let (mut benefit_bearing, mut pending) = (0, 0);
        for sub in merged {
            if sub.has_benefits() {
                benefit_bearing += 1;
            } else if sub.status == SubscriptionStatus::PendingPayment {
                pending += 1;
            }
        }

        if benefit_bearing > 1 || pending > 1 {
            return Err(DomainError::new(
                ErrorCode::SubscriptionExists,
                format!("Owner {} already has a live subscription", key),
            ));
        }
    }
    Ok(())
}

#[async_trait]
impl SubscriptionRepository for InMemorySubscriptionRepository {
    async fn apply(&self, writes: Vec<SubscriptionWrite>) -> Result<Vec<Subscription>, DomainError> {
        let mut records = self.records.write().await;
        let mut staged: HashMap<SubscriptionId, Subscription> = HashMap::new();
        let mut order = Vec::with_capacity(writes.len());
        let mut keys = HashSet::new();

        for write in writes {
            match write {
                SubscriptionWrite::Insert(mut sub) => {
                    if records.contains_key(&sub.id) || staged.contains_key(&sub.id) {
                        return Err(DomainError::new(
                            ErrorCode::SubscriptionExists,
                            format!("Subscription {} already exists", sub.id),
                        ));
                    }
                    sub.version = 1;
                    keys.insert(sub.key());
                    order.push(sub.id);
                    staged.insert(sub.id, sub);
                }
                SubscriptionWrite::Update(mut sub) => {
                    let stored_version = staged
                        .get(&sub.id)
                        .or_else(|| records.get(&sub.id))
                        .map(|s| s.version)
                        .ok_or_else(|| {
                            DomainError::new(
                                ErrorCode::SubscriptionNotFound,
                                format!("Subscription {} not found", sub.id),
                            )
                        })?;

                    if stored_version != sub.version {
                        return Err(DomainError::new(
                            ErrorCode::ConcurrentModification,
                            format!("Subscription {} was modified concurrently", sub.id),
                        )
                        .with_detail("expected_version", sub.version.to_string())
                        .with_detail("stored_version", stored_version.to_string()));
                    }

                    sub.version += 1;
                    keys.insert(sub.key());
                    order.push(sub.id);
                    staged.insert(sub.id, sub);
                }
            }
        }

        check_uniqueness(&records, &staged, &keys)?;

        let committed = order
            .iter()
            .filter_map(|id| staged.get(id).cloned())
            .collect();
        records.extend(staged);
        Ok(committed)
    }

    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn find_current(&self, key: &SubscriptionKey) -> Result<Option<Subscription>, DomainError> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .find(|s| s.has_benefits() && s.owner_id == key.owner_id && s.account_kind == key.account_kind)
            .cloned())
    }

    async fn find_pending(&self, key: &SubscriptionKey) -> Result<Option<Subscription>, DomainError> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .find(|s| {
                s.status == SubscriptionStatus::PendingPayment
                    && s.owner_id == key.owner_id
                    && s.account_kind == key.account_kind
            })
            .cloned())
    }

    async fn find_due_for_rollover(
        &self,
        now: Timestamp,
        limit: usize,
    ) -> Result<Vec<Subscription>, DomainError> {
        let records = self.records.read().await;
        let mut due: Vec<Subscription> = records
            .values()
            .filter(|s| s.is_due_for_rollover(now))
            .cloned()
            .collect();
        due.sort_by_key(|s| s.current_period_end);
        due.truncate(limit);
        Ok(due)
    }

    async fn history(&self, key: &SubscriptionKey) -> Result<Vec<Subscription>, DomainError> {
        let records = self.records.read().await;
        let mut history: Vec<Subscription> = records
            .values()
            .filter(|s| s.owner_id == key.owner_id && s.account_kind == key.account_kind)
            .cloned()
            .collect();
        history.sort_by_key(|s| (s.created_at, s.id));
        Ok(history)
    }
}
