//! Billing policy configuration

use serde::Deserialize;

use super::error::ConfigValidationError;
use crate::domain::foundation::Percentage;
use crate::domain::subscription::{
    AccountKind, FounderPricing, DEFAULT_FOUNDER_DISCOUNT_PERCENT, DEFAULT_FOUNDER_LIMIT,
};

/// Largest founder capacity the PostgreSQL counter column can hold.
const MAX_FOUNDER_LIMIT: u32 = i32::MAX as u32;

/// Founder program and rollover sweep settings.
#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
    #[serde(default = "default_founder_limit")]
    pub professional_founder_limit: u32,

    #[serde(default = "default_founder_limit")]
    pub business_founder_limit: u32,

    /// Whole percent taken off the catalog price for founders
    #[serde(default = "default_founder_discount")]
    pub founder_discount_percent: u8,

    /// Subscriptions handled per sweep call
    #[serde(default = "default_rollover_batch_size")]
    pub rollover_batch_size: usize,

    /// Rollovers run concurrently within one sweep
    #[serde(default = "default_rollover_concurrency")]
    pub rollover_concurrency: usize,

    /// How long processed webhook ids are kept for deduplication
    #[serde(default = "default_webhook_retention_days")]
    pub webhook_retention_days: i64,
}

impl BillingConfig {
    pub fn founder_limit(&self, kind: AccountKind) -> u32 {
        match kind {
            AccountKind::Professional => self.professional_founder_limit,
            AccountKind::Business => self.business_founder_limit,
        }
    }

    /// Pricing policy for the configured discount.
    ///
    /// Call `validate` first; out-of-range percentages are clamped.
    pub fn founder_pricing(&self) -> FounderPricing {
        FounderPricing::new(Percentage::new(self.founder_discount_percent))
    }

    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.founder_discount_percent > 100 {
            return Err(ConfigValidationError::InvalidFounderDiscount(
                self.founder_discount_percent,
            ));
        }
        if self.professional_founder_limit > MAX_FOUNDER_LIMIT
            || self.business_founder_limit > MAX_FOUNDER_LIMIT
        {
            return Err(ConfigValidationError::FounderLimitTooLarge {
                max: MAX_FOUNDER_LIMIT,
            });
        }
        if self.rollover_batch_size == 0 || self.rollover_concurrency == 0 {
            return Err(ConfigValidationError::InvalidBatchSize);
        }
        Ok(())
    }
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            professional_founder_limit: default_founder_limit(),
            business_founder_limit: default_founder_limit(),
            founder_discount_percent: default_founder_discount(),
            rollover_batch_size: default_rollover_batch_size(),
            rollover_concurrency: default_rollover_concurrency(),
            webhook_retention_days: default_webhook_retention_days(),
        }
    }
}

fn default_founder_limit() -> u32 {
    DEFAULT_FOUNDER_LIMIT
}

fn default_founder_discount() -> u8 {
    DEFAULT_FOUNDER_DISCOUNT_PERCENT
}

fn default_rollover_batch_size() -> usize {
    100
}

fn default_rollover_concurrency() -> usize {
    8
}

fn default_webhook_retention_days() -> i64 {
    30
}
