//! Static plan catalog.
//!
//! | Kind | Tier | Price | Quota/month | Featured |
//! |------|------|-------|-------------|----------|
//! | professional | free | 0 | 5 | No |
//! | professional | tier2 | 999 | 30 | No |
//! | professional | tier3 | 1999 | Unlimited | Yes |
//! | business | tier1 | 0 | 10 | No |
//! | business | tier2 | 2999 | 100 | No |
//! | business | tier3 | 5999 | Unlimited | Yes |

use serde::{Deserialize, Serialize};

use super::{AccountKind, PlanTier, SubscriptionError};
use crate::domain::foundation::Money;

/// Quota sentinel for unlimited plans.
///
/// Large enough that `quota_used < UNLIMITED_QUOTA` always holds in practice,
/// so consumption never special-cases unlimited plans.
pub const UNLIMITED_QUOTA: u32 = u32::MAX;

/// Price, quota and feature flags for one (kind, tier) combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanDefinition {
    pub account_kind: AccountKind,
    pub tier: PlanTier,
    /// List price before any founder discount.
    pub base_price: Money,
    pub monthly_quota: u32,
    pub is_featured: bool,
}

impl PlanDefinition {
    const fn new(
        account_kind: AccountKind,
        tier: PlanTier,
        price: u32,
        monthly_quota: u32,
        is_featured: bool,
    ) -> Self {
        Self {
            account_kind,
            tier,
            base_price: Money::from_minor(price),
            monthly_quota,
            is_featured,
        }
    }

    pub fn is_free(&self) -> bool {
        self.base_price.is_zero()
    }

    pub fn is_unlimited(&self) -> bool {
        self.monthly_quota == UNLIMITED_QUOTA
    }
}

const PLANS: [PlanDefinition; 6] = [
    PlanDefinition::new(AccountKind::Professional, PlanTier::Free, 0, 5, false),
    PlanDefinition::new(AccountKind::Professional, PlanTier::Tier2, 999, 30, false),
    PlanDefinition::new(AccountKind::Professional, PlanTier::Tier3, 1999, UNLIMITED_QUOTA, true),
    PlanDefinition::new(AccountKind::Business, PlanTier::Tier1, 0, 10, false),
    PlanDefinition::new(AccountKind::Business, PlanTier::Tier2, 2999, 100, false),
    PlanDefinition::new(AccountKind::Business, PlanTier::Tier3, 5999, UNLIMITED_QUOTA, true),
];

/// Pure lookup over the static plan table.
pub struct PlanCatalog;

impl PlanCatalog {
    /// Resolves a plan.
    ///
    /// # Errors
    ///
    /// `UnknownTier` when the tier does not exist for the account kind
    /// (e.g. a business asking for `free`).
    pub fn lookup(kind: AccountKind, tier: PlanTier) -> Result<PlanDefinition, SubscriptionError> {
        PLANS
            .iter()
            .find(|p| p.account_kind == kind && p.tier == tier)
            .copied()
            .ok_or_else(|| SubscriptionError::unknown_tier(kind, tier))
    }

    /// The zero-price tier of an account kind.
    pub fn free_tier(kind: AccountKind) -> PlanTier {
        match kind {
            AccountKind::Professional => PlanTier::Free,
            AccountKind::Business => PlanTier::Tier1,
        }
    }

    /// Definition of the zero-price plan of an account kind.
    pub fn free_plan(kind: AccountKind) -> PlanDefinition {
        let tier = Self::free_tier(kind);
        match PLANS.iter().find(|p| p.account_kind == kind && p.tier == tier) {
            Some(plan) => *plan,
            None => PlanDefinition::new(kind, tier, 0, 0, false),
        }
    }

    /// All tiers offered to an account kind, cheapest first.
    pub fn tiers(kind: AccountKind) -> Vec<PlanDefinition> {
        PLANS.iter().filter(|p| p.account_kind == kind).copied().collect()
    }
}
