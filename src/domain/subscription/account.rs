//! Account kinds and plan tiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{OwnerId, ValidationError};

/// The kind of paying account a subscription belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    /// Independent professional.
    Professional,
    /// Business account.
    Business,
}

impl AccountKind {
    pub const ALL: [AccountKind; 2] = [AccountKind::Professional, AccountKind::Business];

    pub fn as_str(&self) -> &'static str {
        match self {
            AccountKind::Professional => "professional",
            AccountKind::Business => "business",
        }
    }
}

impl fmt::Display for AccountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "professional" => Ok(AccountKind::Professional),
            "business" => Ok(AccountKind::Business),
            other => Err(ValidationError::invalid_format(
                "account_kind",
                format!("unknown account kind '{}'", other),
            )),
        }
    }
}

/// Plan tier name.
///
/// Which tiers exist depends on the account kind; the catalog is the
/// authority on valid combinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Free,
    Tier1,
    Tier2,
    Tier3,
}

impl PlanTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Tier1 => "tier1",
            PlanTier::Tier2 => "tier2",
            PlanTier::Tier3 => "tier3",
        }
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanTier {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(PlanTier::Free),
            "tier1" => Ok(PlanTier::Tier1),
            "tier2" => Ok(PlanTier::Tier2),
            "tier3" => Ok(PlanTier::Tier3),
            other => Err(ValidationError::invalid_format(
                "plan_tier",
                format!("unknown plan tier '{}'", other),
            )),
        }
    }
}

/// The scope of the one-benefit-bearing-subscription rule: an owner per account kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionKey {
    pub owner_id: OwnerId,
    pub account_kind: AccountKind,
}

impl SubscriptionKey {
    pub fn new(owner_id: OwnerId, account_kind: AccountKind) -> Self {
        Self {
            owner_id,
            account_kind,
        }
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.account_kind, self.owner_id)
    }
}
