//! In-memory founder allocator.
//!
//! One mutex per account kind serializes grants, so the capacity check and the
//! increment happen as one step.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::domain::foundation::{DomainError, ErrorCode, OwnerId};
use crate::domain::subscription::{
    AccountKind, FounderAllocation, FounderGrant, FounderSnapshot, DEFAULT_FOUNDER_LIMIT,
};
use crate::ports::FounderAllocator;

#[derive(Debug)]
pub struct InMemoryFounderAllocator {
    counters: HashMap<AccountKind, Mutex<FounderAllocation>>,
}

impl InMemoryFounderAllocator {
    /// Creates counters with separate capacities per account kind.
    pub fn new(professional_limit: u32, business_limit: u32) -> Self {
        let counters = AccountKind::ALL
            .into_iter()
            .map(|kind| {
                let limit = match kind {
                    AccountKind::Professional => professional_limit,
                    AccountKind::Business => business_limit,
                };
                (kind, Mutex::new(FounderAllocation::new(kind, limit)))
            })
            .collect();
        Self { counters }
    }

    /// Same capacity for every account kind.
    pub fn with_limit(limit: u32) -> Self {
        Self::new(limit, limit)
    }

    fn counter(&self, kind: AccountKind) -> Result<&Mutex<FounderAllocation>, DomainError> {
        self.counters.get(&kind).ok_or_else(|| {
            DomainError::new(
                ErrorCode::InternalError,
                format!("No founder counter for {}", kind),
            )
        })
    }
}

impl Default for InMemoryFounderAllocator {
    fn default() -> Self {
        Self::with_limit(DEFAULT_FOUNDER_LIMIT)
    }
}

#[async_trait]
impl FounderAllocator for InMemoryFounderAllocator {
    async fn try_grant_founder_status(
        &self,
        account_kind: AccountKind,
        owner_id: &OwnerId,
    ) -> Result<FounderGrant, DomainError> {
        let mut counter = self.counter(account_kind)?.lock().await;
        Ok(counter.try_grant(owner_id))
    }

    async fn is_founder(&self, account_kind: AccountKind, owner_id: &OwnerId) -> Result<bool, DomainError> {
        let counter = self.counter(account_kind)?.lock().await;
        Ok(counter.is_holder(owner_id))
    }

    async fn snapshot(&self, account_kind: AccountKind) -> Result<FounderSnapshot, DomainError> {
        let counter = self.counter(account_kind)?.lock().await;
        Ok(counter.snapshot())
    }
}
