//! Per-period usage counter.

use serde::{Deserialize, Serialize};

/// Usage against a monthly allowance.
///
/// `quota_used` only ever grows within a period; `reset` is called on rollover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaUsage {
    pub monthly_quota: u32,
    pub quota_used: u32,
}

impl QuotaUsage {
    pub fn new(monthly_quota: u32) -> Self {
        Self {
            monthly_quota,
            quota_used: 0,
        }
    }

    /// Consumes one unit if any remain.
    ///
    /// Returns `false` without mutation when the allowance is used up.
    pub fn try_consume(&mut self) -> bool {
        if self.quota_used >= self.monthly_quota {
            return false;
        }
        self.quota_used += 1;
        true
    }

    pub fn remaining(&self) -> u32 {
        self.monthly_quota.saturating_sub(self.quota_used)
    }

    pub fn reset(&mut self) {
        self.quota_used = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::subscription::UNLIMITED_QUOTA;

    #[test]
    fn consume_below_limit_increments_by_one() {
        let mut quota = QuotaUsage::new(5);
        assert!(quota.try_consume());
        assert_eq!(quota.quota_used, 1);
        assert_eq!(quota.remaining(), 4);
    }

    #[test]
    fn consume_at_limit_is_refused_unchanged() {
        let mut quota = QuotaUsage {
            monthly_quota: 5,
            quota_used: 5,
        };
        assert!(!quota.try_consume());
        assert_eq!(quota.quota_used, 5);
    }

    #[test]
    fn over_limit_after_downgrade_stays_refused() {
        let mut quota = QuotaUsage {
            monthly_quota: 5,
            quota_used: 7,
        };
        assert!(!quota.try_consume());
        assert_eq!(quota.remaining(), 0);
    }

    #[test]
    fn unlimited_sentinel_needs_no_special_case() {
        let mut quota = QuotaUsage::new(UNLIMITED_QUOTA);
        for _ in 0..1000 {
            assert!(quota.try_consume());
        }
        assert_eq!(quota.remaining(), UNLIMITED_QUOTA - 1000);
    }

    #[test]
    fn reset_clears_usage() {
        let mut quota = QuotaUsage::new(3);
        quota.try_consume();
        quota.reset();
        assert_eq!(quota.quota_used, 0);
    }
}
