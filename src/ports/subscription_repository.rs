//! Subscription repository port.
//!
//! # Design
//!
//! - **Atomic batches**: a plan change writes the retired record and its
//!   successor together through `apply`
//! - **Optimistic locking**: updates compare `version` and bump it
//! - **One benefit-bearing record per owner+kind**: enforced by the store
//!   (partial unique index in PostgreSQL)

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, SubscriptionId, Timestamp};
use crate::domain::subscription::{Subscription, SubscriptionKey};

/// One write in an atomic batch.
#[derive(Debug, Clone)]
pub enum SubscriptionWrite {
    /// New record; `version` is ignored and stored as 1.
    Insert(Subscription),
    /// Existing record; succeeds only if the stored version equals `version`.
    Update(Subscription),
}

impl SubscriptionWrite {
    pub fn subscription(&self) -> &Subscription {
        match self {
            SubscriptionWrite::Insert(s) | SubscriptionWrite::Update(s) => s,
        }
    }
}

/// Repository port for Subscription persistence.
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Applies all writes or none.
    ///
    /// Returns the committed records in input order, with their new versions.
    ///
    /// # Errors
    ///
    /// - `ConcurrentModification` if an update's version is stale
    /// - `SubscriptionNotFound` if an updated record does not exist
    /// - `SubscriptionExists` if the batch would leave two benefit-bearing
    ///   (or two pending) records for one owner+kind
    /// - `DatabaseError` on persistence failure
    async fn apply(&self, writes: Vec<SubscriptionWrite>) -> Result<Vec<Subscription>, DomainError>;

    /// Find a record by id, in any status.
    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError>;

    /// The active or cancelling record for an owner+kind.
    async fn find_current(&self, key: &SubscriptionKey) -> Result<Option<Subscription>, DomainError>;

    /// The pending-payment record for an owner+kind.
    async fn find_pending(&self, key: &SubscriptionKey) -> Result<Option<Subscription>, DomainError>;

    /// Benefit-bearing records whose period ended at or before `now`, oldest first.
    async fn find_due_for_rollover(
        &self,
        now: Timestamp,
        limit: usize,
    ) -> Result<Vec<Subscription>, DomainError>;

    /// All records for an owner+kind, oldest first.
    async fn history(&self, key: &SubscriptionKey) -> Result<Vec<Subscription>, DomainError>;

    /// Inserts a single record.
    async fn insert(&self, subscription: Subscription) -> Result<Subscription, DomainError> {
        single(self.apply(vec![SubscriptionWrite::Insert(subscription)]).await?)
    }

    /// Updates a single record.
    async fn update(&self, subscription: Subscription) -> Result<Subscription, DomainError> {
        single(self.apply(vec![SubscriptionWrite::Update(subscription)]).await?)
    }
}

fn single(mut committed: Vec<Subscription>) -> Result<Subscription, DomainError> {
    committed
        .pop()
        .ok_or_else(|| DomainError::database("repository returned no committed record"))
}
