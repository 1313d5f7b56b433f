//! Accrual (interest) math for stakes.
//!
//! All arithmetic stays in decimal. Compound growth over whole periods is
//! `(1 + x)^k` with `x = apr * period_days / 365`; inside a partially elapsed
//! period growth is linear, `(1 + x * f)`. For whole periods this equals
//! `(1 + apr/m)^(m*t) - 1` exactly, and it never yields less than simple
//! interest over the same window.

use crate::domain::{AccrualMethod, Decimal, RateSegment, Stake, TimeMs, MS_PER_DAY};
use rust_decimal::{Decimal as RustDecimal, MathematicalOps};

/// Days in an accrual year.
pub const DAYS_PER_YEAR: i64 = 365;
/// Milliseconds in an accrual year (365 days).
pub const MS_PER_YEAR: i64 = DAYS_PER_YEAR * MS_PER_DAY;

/// Pure accrual calculator.
pub struct AccrualCalculator;

impl AccrualCalculator {
    /// Accrued interest for `principal` at `apr` over `elapsed_ms`, unrounded.
    ///
    /// Returns 0 for non-positive elapsed time or principal. Saturates at
    /// `Decimal::MAX` rather than overflowing.
    pub fn accrue(principal: Decimal, apr: Decimal, elapsed_ms: i64, method: AccrualMethod) -> Decimal {
        let segment = RateSegment {
            from: TimeMs::new(0),
            to: TimeMs::new(elapsed_ms.max(0)),
            apr,
        };
        Self::accrue_segments(principal, &[segment], method)
    }

    /// Accrued interest across consecutive rate segments, unrounded.
    pub fn accrue_segments(
        principal: Decimal,
        segments: &[RateSegment],
        method: AccrualMethod,
    ) -> Decimal {
        if !principal.is_positive() {
            return Decimal::zero();
        }
        let simple = Self::simple_interest(principal.inner(), segments);
        let accrued = match method {
            AccrualMethod::Simple => simple,
            AccrualMethod::Compound { period_days } => {
                let compound = Self::compound_interest(principal.inner(), segments, period_days);
                // Decimal rounding noise must not push compound below simple.
                compound.max(simple)
            }
        };
        Decimal::new(accrued).non_negative()
    }

    /// Accrued amount of `stake` as of `as_of`, rounded to cents.
    ///
    /// Accrual runs from `start_at` to `min(as_of, deadline)`. A stake that
    /// has left the accrual-eligible set reports its frozen amount.
    pub fn calculate_accrued_amount(stake: &Stake, as_of: TimeMs) -> Decimal {
        if !stake.status.is_accrual_eligible() {
            return stake.accrued_amount;
        }
        Self::accrued_between(stake, stake.start_at, as_of.min(stake.deadline))
    }

    /// Accrual the stake would show at `target`, for previews. Ignores status
    /// and commits nothing.
    pub fn calculate_projected_accrual(stake: &Stake, target: TimeMs) -> Decimal {
        Self::accrued_between(stake, stake.start_at, target.min(stake.deadline))
    }

    fn accrued_between(stake: &Stake, from: TimeMs, to: TimeMs) -> Decimal {
        let segments = stake.apr_model.segments(stake.principal, from, to);
        Self::accrue_segments(stake.principal, &segments, stake.accrual_method).round_money()
    }

    fn simple_interest(principal: RustDecimal, segments: &[RateSegment]) -> RustDecimal {
        let ms_per_year = RustDecimal::from(MS_PER_YEAR);
        let mut total = RustDecimal::ZERO;
        for seg in segments {
            let elapsed = seg.to.millis_since(seg.from);
            if elapsed <= 0 {
                continue;
            }
            let interest = principal
                .checked_mul(seg.apr.inner())
                .and_then(|v| v.checked_mul(RustDecimal::from(elapsed)))
                .and_then(|v| v.checked_div(ms_per_year))
                .unwrap_or(RustDecimal::MAX);
            total = total.checked_add(interest).unwrap_or(RustDecimal::MAX);
        }
        total
    }

    fn compound_interest(principal: RustDecimal, segments: &[RateSegment], period_days: u32) -> RustDecimal {
        let growth = segments
            .iter()
            .try_fold(RustDecimal::ONE, |acc, seg| {
                acc.checked_mul(Self::growth_factor(seg, period_days)?)
            });
        growth
            .and_then(|g| principal.checked_mul(g - RustDecimal::ONE))
            .unwrap_or(RustDecimal::MAX)
    }

    /// `(1 + x)^k * (1 + x * f)` for one segment; `None` on overflow.
    fn growth_factor(seg: &RateSegment, period_days: u32) -> Option<RustDecimal> {
        let elapsed = seg.to.millis_since(seg.from);
        if elapsed <= 0 || period_days == 0 {
            return Some(RustDecimal::ONE);
        }
        let period_ms = i64::from(period_days) * MS_PER_DAY;
        let whole_periods = elapsed / period_ms;
        let remainder_ms = elapsed % period_ms;

        let per_period_rate = seg
            .apr
            .inner()
            .checked_mul(RustDecimal::from(period_days))?
            .checked_div(RustDecimal::from(DAYS_PER_YEAR))?;
        let fraction =
            RustDecimal::from(remainder_ms).checked_div(RustDecimal::from(period_ms))?;

        let whole = (RustDecimal::ONE + per_period_rate).checked_powi(whole_periods)?;
        let partial = RustDecimal::ONE.checked_add(per_period_rate.checked_mul(fraction)?)?;
        whole.checked_mul(partial)
    }
}
