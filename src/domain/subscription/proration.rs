//! Proportional refund arithmetic.
//!
//! Refunds are computed on whole days:
//!
//! ```text
//! total     = max(1, days(end - start))
//! remaining = clamp(days(end - as_of), 0, total)
//! refund    = round_half_up(price * remaining / total)
//! ```
//!
//! At or before the period start the full price comes back, whatever the
//! period length.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{Money, Timestamp};

/// A computed refund together with the day counts it was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundQuote {
    pub amount: Money,
    pub remaining_days: i64,
    pub total_days: i64,
}

/// Computes the refund for the unused part of a billing period.
pub fn quote_refund(
    period_start: Timestamp,
    period_end: Timestamp,
    price: Money,
    as_of: Timestamp,
) -> RefundQuote {
    let total_days = period_end.whole_days_since(&period_start).max(1);
    if as_of <= period_start {
        return RefundQuote {
            amount: price,
            remaining_days: total_days,
            total_days,
        };
    }

    let remaining_days = period_end
        .whole_days_since(&as_of)
        .clamp(0, total_days);

    RefundQuote {
        amount: price.prorate(remaining_days, total_days),
        remaining_days,
        total_days,
    }
}

/// Refund amount only.
pub fn compute_refund(
    period_start: Timestamp,
    period_end: Timestamp,
    price: Money,
    as_of: Timestamp,
) -> Money {
    quote_refund(period_start, period_end, price, as_of).amount
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn start() -> Timestamp {
        Timestamp::from_unix_secs(1_717_200_000).unwrap()
    }

    #[test]
    fn ten_days_into_thirty_refunds_two_thirds() {
        let quote = quote_refund(
            start(),
            start().add_days(30),
            Money::from_minor(1200),
            start().add_days(10),
        );
        assert_eq!(quote.amount.minor_units(), 800);
        assert_eq!(quote.remaining_days, 20);
        assert_eq!(quote.total_days, 30);
    }

    #[test]
    fn partial_day_counts_as_used() {
        // 10 days and 1 hour in: 19 whole days remain.
        let as_of = start().add_days(10).plus_secs(3600);
        let refund = compute_refund(start(), start().add_days(30), Money::from_minor(1200), as_of);
        assert_eq!(refund.minor_units(), 760);
    }

    #[test]
    fn at_or_after_end_is_zero() {
        let end = start().add_days(30);
        let price = Money::from_minor(999);
        assert_eq!(compute_refund(start(), end, price, end), Money::ZERO);
        assert_eq!(compute_refund(start(), end, price, end.add_days(5)), Money::ZERO);
    }

    #[test]
    fn at_or_before_start_is_full_price() {
        let end = start().add_days(30);
        let price = Money::from_minor(999);
        assert_eq!(compute_refund(start(), end, price, start()), price);
        assert_eq!(compute_refund(start(), end, price, start().minus_days(3)), price);
    }

    #[test]
    fn sub_day_period_uses_one_day_total() {
        let end = start().plus_secs(3600);
        let price = Money::from_minor(500);
        let quote = quote_refund(start(), end, price, start());
        assert_eq!(quote.total_days, 1);
        assert_eq!(quote.remaining_days, 1);
        assert_eq!(quote.amount, price);
        assert_eq!(compute_refund(start(), end, price, start().plus_secs(-60)), price);
        assert_eq!(compute_refund(start(), end, price, start().plus_secs(60)), Money::ZERO);
    }

    proptest! {
        #[test]
        fn refund_never_increases_with_time(
            price in 0u32..1_000_000,
            period_days in 1i64..120,
            a in -10i64..150,
            b in -10i64..150,
        ) {
            let end = start().add_days(period_days);
            let price = Money::from_minor(price);
            let (early, late) = if a <= b { (a, b) } else { (b, a) };

            let early_refund = compute_refund(start(), end, price, start().add_days(early));
            let late_refund = compute_refund(start(), end, price, start().add_days(late));
            prop_assert!(late_refund <= early_refund);
        }

        #[test]
        fn refund_is_bounded_by_price(
            price in 0u32..1_000_000,
            period_days in 1i64..120,
            offset_secs in -864_000i64..12_960_000,
        ) {
            let end = start().add_days(period_days);
            let price = Money::from_minor(price);
            let refund = compute_refund(start(), end, price, start().plus_secs(offset_secs));
            prop_assert!(refund <= price);
            prop_assert!(refund >= Money::ZERO);
        }

        #[test]
        fn full_price_at_start_for_any_period_length(
            price in 0u32..1_000_000,
            period_secs in 1i64..12_960_000,
            before_secs in 0i64..864_000,
        ) {
            let end = start().plus_secs(period_secs);
            let price = Money::from_minor(price);
            prop_assert_eq!(compute_refund(start(), end, price, start()), price);
            prop_assert_eq!(compute_refund(start(), end, price, start().plus_secs(-before_secs)), price);
        }
    }
}
