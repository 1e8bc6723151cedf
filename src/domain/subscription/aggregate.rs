//! Subscription aggregate entity.
//!
//! One record per plan selection. Changing tier never mutates a record in place;
//! it creates a new record and expires the old one (`superseded_by`).
//!
//! # Design Decisions
//!
//! - **Money in minor units**: `price` is integer, already net of any founder discount
//! - **Clock injected**: every mutating method takes `now`; nothing reads the wall clock
//! - **Optimistic concurrency**: `version` is compared and bumped by the repository

use serde::{Deserialize, Serialize};

use super::proration::{quote_refund, RefundQuote};
use super::{
    AccountKind, ExpiredReason, PlanCatalog, PlanDefinition, PlanTier, QuotaUsage,
    SubscriptionError, SubscriptionKey, SubscriptionStatus,
};
use crate::domain::foundation::{Money, OwnerId, StateMachine, SubscriptionId, Timestamp};

/// Result of applying period rollover to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolloverOutcome {
    /// Period has not ended, or the record carries no benefits.
    NotDue,
    /// Period rolled forward `periods` times.
    Renewed { periods: u32 },
    /// Benefits end; the caller replaces the record with the free tier.
    Lapsed { reason: ExpiredReason },
}

/// Subscription aggregate.
///
/// # Invariants
///
/// - `current_period_start < current_period_end`
/// - `price` is fixed for the life of the period
/// - `quota.quota_used` only decreases on rollover
/// - Status changes follow `SubscriptionStatus` transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub owner_id: OwnerId,
    pub account_kind: AccountKind,
    pub tier: PlanTier,
    pub status: SubscriptionStatus,
    pub current_period_start: Timestamp,
    pub current_period_end: Timestamp,

    /// Amount charged for the current period.
    pub price: Money,
    pub has_founder_discount: bool,
    pub is_featured: bool,
    pub quota: QuotaUsage,

    /// Set when end-of-period cancellation was requested.
    pub cancelled_at: Option<Timestamp>,

    /// Gateway reference of the charge that paid the current period.
    pub payment_reference_id: Option<String>,

    /// Gateway reference of a confirmed charge for the upcoming period.
    pub next_period_payment_reference: Option<String>,

    /// Record that replaced this one, if any.
    pub superseded_by: Option<SubscriptionId>,

    /// Optimistic concurrency version; 0 until first persisted.
    pub version: u64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Subscription {
    fn from_plan(
        owner_id: OwnerId,
        plan: &PlanDefinition,
        status: SubscriptionStatus,
        price: Money,
        has_founder_discount: bool,
        now: Timestamp,
    ) -> Self {
        Self {
            id: SubscriptionId::new(),
            owner_id,
            account_kind: plan.account_kind,
            tier: plan.tier,
            status,
            current_period_start: now,
            current_period_end: now.add_months(1),
            price,
            has_founder_discount,
            is_featured: plan.is_featured,
            quota: QuotaUsage::new(plan.monthly_quota),
            cancelled_at: None,
            payment_reference_id: None,
            next_period_payment_reference: None,
            superseded_by: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates an active free-tier subscription starting at `now`.
    pub fn create_free(
        owner_id: OwnerId,
        account_kind: AccountKind,
        has_founder_discount: bool,
        now: Timestamp,
    ) -> Self {
        let plan = PlanCatalog::free_plan(account_kind);
        Self::from_plan(
            owner_id,
            &plan,
            SubscriptionStatus::Active,
            Money::ZERO,
            has_founder_discount,
            now,
        )
    }

    /// Creates a paid subscription awaiting its first charge.
    ///
    /// The period is provisional; activation restarts it at confirmation time.
    pub fn create_pending(
        owner_id: OwnerId,
        plan: &PlanDefinition,
        price: Money,
        has_founder_discount: bool,
        now: Timestamp,
    ) -> Self {
        Self::from_plan(
            owner_id,
            plan,
            SubscriptionStatus::PendingPayment,
            price,
            has_founder_discount,
            now,
        )
    }

    pub fn key(&self) -> SubscriptionKey {
        SubscriptionKey::new(self.owner_id.clone(), self.account_kind)
    }

    /// True for the zero-price tier of the account kind.
    pub fn is_free(&self) -> bool {
        self.tier == PlanCatalog::free_tier(self.account_kind)
    }

    pub fn has_benefits(&self) -> bool {
        self.status.has_benefits()
    }

    /// Whether the current period has ended for a benefit-bearing record.
    pub fn is_due_for_rollover(&self, now: Timestamp) -> bool {
        self.has_benefits() && now >= self.current_period_end
    }

    fn set_status(&mut self, target: SubscriptionStatus, operation: &str) -> Result<(), SubscriptionError> {
        self.status = self
            .status
            .transition_to(target)
            .map_err(|_| SubscriptionError::invalid_state(self.status, operation))?;
        Ok(())
    }

    /// Confirms the first charge: pending → active, period starts now.
    pub fn activate(
        &mut self,
        payment_reference: impl Into<String>,
        now: Timestamp,
    ) -> Result<(), SubscriptionError> {
        if self.status != SubscriptionStatus::PendingPayment {
            return Err(SubscriptionError::invalid_state(self.status, "activate"));
        }
        self.set_status(SubscriptionStatus::Active, "activate")?;
        self.current_period_start = now;
        self.current_period_end = now.add_months(1);
        self.payment_reference_id = Some(payment_reference.into());
        self.quota.reset();
        self.updated_at = now;
        Ok(())
    }

    /// End-of-period cancellation: active → cancelling.
    pub fn schedule_cancellation(&mut self, now: Timestamp) -> Result<(), SubscriptionError> {
        if self.status != SubscriptionStatus::Active || self.is_free() {
            return Err(SubscriptionError::invalid_state(self.status, "cancel"));
        }
        self.set_status(SubscriptionStatus::Cancelling, "cancel")?;
        self.cancelled_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Withdraws a scheduled cancellation before the period ends.
    pub fn reactivate(&mut self, now: Timestamp) -> Result<(), SubscriptionError> {
        if self.status != SubscriptionStatus::Cancelling {
            return Err(SubscriptionError::invalid_state(self.status, "reactivate"));
        }
        if now >= self.current_period_end {
            return Err(SubscriptionError::ReactivationWindowClosed {
                subscription_id: self.id,
                period_end: self.current_period_end,
            });
        }
        self.set_status(SubscriptionStatus::Active, "reactivate")?;
        self.cancelled_at = None;
        self.updated_at = now;
        Ok(())
    }

    /// Checks that a paid, benefit-bearing record may be ended right now.
    pub fn ensure_can_end_immediately(&self) -> Result<(), SubscriptionError> {
        if !self.has_benefits() || self.is_free() {
            return Err(SubscriptionError::invalid_state(self.status, "cancel"));
        }
        Ok(())
    }

    /// Prorated refund for cancelling at `now`, with the reference to refund against.
    pub fn refund_quote(&self, now: Timestamp) -> Result<(RefundQuote, String), SubscriptionError> {
        self.ensure_can_end_immediately()?;
        let reference = self
            .payment_reference_id
            .clone()
            .ok_or(SubscriptionError::MissingPaymentReference(self.id))?;
        let quote = quote_refund(
            self.current_period_start,
            self.current_period_end,
            self.price,
            now,
        );
        Ok((quote, reference))
    }

    /// Expires the record without a successor.
    pub fn expire(&mut self, now: Timestamp) -> Result<(), SubscriptionError> {
        self.set_status(SubscriptionStatus::Expired, "expire")?;
        self.updated_at = now;
        Ok(())
    }

    /// Expires the record in favour of `successor`.
    pub fn supersede(&mut self, successor: SubscriptionId, now: Timestamp) -> Result<(), SubscriptionError> {
        self.expire(now)?;
        self.superseded_by = Some(successor);
        Ok(())
    }

    /// Records a confirmed charge for the upcoming period.
    pub fn record_renewal_payment(
        &mut self,
        payment_reference: impl Into<String>,
        now: Timestamp,
    ) -> Result<(), SubscriptionError> {
        if self.status != SubscriptionStatus::Active || self.is_free() {
            return Err(SubscriptionError::invalid_state(self.status, "record renewal for"));
        }
        self.next_period_payment_reference = Some(payment_reference.into());
        self.updated_at = now;
        Ok(())
    }

    fn advance_period(&mut self) {
        self.current_period_start = self.current_period_end;
        self.current_period_end = self.current_period_end.add_months(1);
        self.quota.reset();
    }

    /// Applies the period-end rules if the period has ended.
    ///
    /// Free plans renew themselves until the period covers `now`. Paid plans
    /// renew one period per confirmed renewal payment; call again until
    /// `NotDue` or `Lapsed`. Lapsed records are left untouched for the caller
    /// to supersede.
    pub fn roll_over(&mut self, now: Timestamp) -> RolloverOutcome {
        if !self.is_due_for_rollover(now) {
            return RolloverOutcome::NotDue;
        }

        if self.status == SubscriptionStatus::Cancelling {
            return RolloverOutcome::Lapsed {
                reason: ExpiredReason::CancelledAtPeriodEnd,
            };
        }

        if self.is_free() {
            let mut periods = 0;
            while now >= self.current_period_end {
                self.advance_period();
                periods += 1;
            }
            self.updated_at = now;
            return RolloverOutcome::Renewed { periods };
        }

        match self.next_period_payment_reference.take() {
            Some(reference) => {
                self.advance_period();
                self.payment_reference_id = Some(reference);
                self.updated_at = now;
                RolloverOutcome::Renewed { periods: 1 }
            }
            None => RolloverOutcome::Lapsed {
                reason: ExpiredReason::UnpaidRenewal,
            },
        }
    }

    /// Consumes one unit of the monthly quota.
    ///
    /// Returns `Ok(false)` when the quota is used up.
    pub fn consume_unit(&mut self, now: Timestamp) -> Result<bool, SubscriptionError> {
        if !self.has_benefits() {
            return Err(SubscriptionError::invalid_state(self.status, "consume quota on"));
        }
        let consumed = self.quota.try_consume();
        if consumed {
            self.updated_at = now;
        }
        Ok(consumed)
    }

    pub fn remaining_quota(&self) -> u32 {
        self.quota.remaining()
    }
}
