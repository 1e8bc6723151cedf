//! Founder discount allocation.
//!
//! The first `limit` owners of an account kind to reach a paid plan receive a
//! permanent percentage discount. Holders keep it after the cap is reached.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::{AccountKind, PlanDefinition};
use crate::domain::foundation::{Money, OwnerId, Percentage};

/// Default founder capacity per account kind.
pub const DEFAULT_FOUNDER_LIMIT: u32 = 1000;

/// Default founder discount.
pub const DEFAULT_FOUNDER_DISCOUNT_PERCENT: u8 = 20;

/// Outcome of a grant attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FounderGrant {
    /// Newly granted; `ordinal` is the owner's 1-based position.
    Granted { ordinal: u32 },
    /// Owner already held founder status.
    AlreadyHeld,
    /// Capacity reached; owner pays full price.
    Exhausted,
}

impl FounderGrant {
    /// Whether the owner is a founder after this attempt.
    pub fn is_founder(&self) -> bool {
        !matches!(self, FounderGrant::Exhausted)
    }
}

/// Read-only view of a counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FounderSnapshot {
    pub account_kind: AccountKind,
    pub limit: u32,
    pub count: u32,
}

impl FounderSnapshot {
    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.count)
    }
}

/// Capacity-bounded counter for one account kind.
///
/// Not synchronized; callers hold it behind a lock or a database row lock.
#[derive(Debug, Clone)]
pub struct FounderAllocation {
    account_kind: AccountKind,
    limit: u32,
    count: u32,
    holders: HashSet<OwnerId>,
}

impl FounderAllocation {
    pub fn new(account_kind: AccountKind, limit: u32) -> Self {
        Self {
            account_kind,
            limit,
            count: 0,
            holders: HashSet::new(),
        }
    }

    /// Grants founder status to `owner` if capacity remains.
    ///
    /// Idempotent per owner; `count` grows by at most one per distinct owner.
    pub fn try_grant(&mut self, owner: &OwnerId) -> FounderGrant {
        if self.holders.contains(owner) {
            return FounderGrant::AlreadyHeld;
        }
        if self.count >= self.limit {
            return FounderGrant::Exhausted;
        }
        self.count += 1;
        self.holders.insert(owner.clone());
        FounderGrant::Granted { ordinal: self.count }
    }

    pub fn is_holder(&self, owner: &OwnerId) -> bool {
        self.holders.contains(owner)
    }

    pub fn snapshot(&self) -> FounderSnapshot {
        FounderSnapshot {
            account_kind: self.account_kind,
            limit: self.limit,
            count: self.count,
        }
    }
}

/// Applies the founder discount to catalog prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FounderPricing {
    discount: Percentage,
}

impl FounderPricing {
    pub fn new(discount: Percentage) -> Self {
        Self { discount }
    }

    pub fn discount(&self) -> Percentage {
        self.discount
    }

    /// Price charged per period for `plan`.
    pub fn price_for(&self, plan: &PlanDefinition, is_founder: bool) -> Money {
        if is_founder {
            plan.base_price.discounted(self.discount)
        } else {
            plan.base_price
        }
    }
}

impl Default for FounderPricing {
    fn default() -> Self {
        Self::new(Percentage::new(DEFAULT_FOUNDER_DISCOUNT_PERCENT))
    }
}
