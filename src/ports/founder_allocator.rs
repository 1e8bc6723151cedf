//! FounderAllocator port - capacity-bounded founder discount grants.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, OwnerId};
use crate::domain::subscription::{AccountKind, FounderGrant, FounderSnapshot};

/// Port for the founder counter of each account kind.
///
/// Implementations must ensure:
/// - No more than `limit` grants per kind, ever
/// - At most one increment per distinct owner (repeat calls return `AlreadyHeld`)
/// - Grants are durable once returned
#[async_trait]
pub trait FounderAllocator: Send + Sync {
    /// Grants founder status if capacity remains.
    async fn try_grant_founder_status(
        &self,
        account_kind: AccountKind,
        owner_id: &OwnerId,
    ) -> Result<FounderGrant, DomainError>;

    /// Whether the owner already holds founder status.
    async fn is_founder(&self, account_kind: AccountKind, owner_id: &OwnerId) -> Result<bool, DomainError>;

    /// Current counter state.
    async fn snapshot(&self, account_kind: AccountKind) -> Result<FounderSnapshot, DomainError>;
}
