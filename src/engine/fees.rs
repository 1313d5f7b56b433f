//! Creation and withdrawal fees.

use crate::domain::{Decimal, Stake, TimeMs};
use crate::engine::accrual::AccrualCalculator;
use serde::Serialize;

/// Fee view of a stake at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeBreakdown {
    pub creation_fee: Decimal,
    /// Fee if the stake were withdrawn at the evaluation time.
    pub withdrawal_fee: Decimal,
    /// Preview only; never used for committed settlement.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projected_withdrawal_fee: Option<Decimal>,
}

pub struct FeeCalculator;

impl FeeCalculator {
    /// `principal * fee_rate_on_stake`, rounded to cents.
    pub fn creation_fee(principal: Decimal, fee_rate_on_stake: Decimal) -> Decimal {
        (principal * fee_rate_on_stake).round_money().non_negative()
    }

    /// `amount * fee_rate_on_withdrawal`, rounded to cents. `amount` is the
    /// current value (principal + accrued), not the principal alone.
    pub fn withdrawal_fee(amount: Decimal, fee_rate_on_withdrawal: Decimal) -> Decimal {
        (amount * fee_rate_on_withdrawal).round_money().non_negative()
    }

    /// Fees for `stake` evaluated at `as_of`, with an optional projection.
    pub fn breakdown(stake: &Stake, as_of: TimeMs, project_to: Option<TimeMs>) -> FeeBreakdown {
        let accrued = AccrualCalculator::calculate_accrued_amount(stake, as_of);
        let projected_withdrawal_fee = project_to.map(|target| {
            let projected = AccrualCalculator::calculate_projected_accrual(stake, target);
            Self::withdrawal_fee(stake.principal + projected, stake.fee_rate_on_withdrawal)
        });

        FeeBreakdown {
            creation_fee: Self::creation_fee(stake.principal, stake.fee_rate_on_stake),
            withdrawal_fee: Self::withdrawal_fee(
                stake.principal + accrued,
                stake.fee_rate_on_withdrawal,
            ),
            projected_withdrawal_fee,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AccrualMethod, AprModel, GoalId, StakeId, StakeStatus, UserId};
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn stake() -> Stake {
        Stake {
            id: StakeId::new("s1"),
            goal_id: GoalId::new("g1"),
            user_id: UserId::new("u1"),
            principal: dec("100"),
            apr_model: AprModel::Fixed { apr: dec("0.12") },
            accrual_method: AccrualMethod::Simple,
            fee_rate_on_stake: dec("0.05"),
            fee_rate_on_withdrawal: dec("0.01"),
            accrued_amount: Decimal::zero(),
            status: StakeStatus::Active,
            start_at: TimeMs::new(0),
            last_accrual_at: TimeMs::new(0),
            deadline: TimeMs::new(0).plus_days(730),
        }
    }

    #[test]
    fn test_creation_fee() {
        assert_eq!(FeeCalculator::creation_fee(dec("100"), dec("0.05")), dec("5"));
        assert_eq!(FeeCalculator::creation_fee(dec("33.33"), dec("0.015")), dec("0.50"));
    }

    #[test]
    fn test_withdrawal_fee_uses_current_value() {
        let s = stake();
        let breakdown = FeeCalculator::breakdown(&s, TimeMs::new(0).plus_days(365), None);
        // (100 + 12) * 0.01
        assert_eq!(breakdown.withdrawal_fee, dec("1.12"));
        assert_eq!(breakdown.creation_fee, dec("5"));
        assert_eq!(breakdown.projected_withdrawal_fee, None);
    }

    #[test]
    fn test_projected_withdrawal_fee() {
        let s = stake();
        let breakdown = FeeCalculator::breakdown(
            &s,
            TimeMs::new(0),
            Some(TimeMs::new(0).plus_days(730)),
        );
        assert_eq!(breakdown.withdrawal_fee, dec("1"));
        // (100 + 24) * 0.01
        assert_eq!(breakdown.projected_withdrawal_fee, Some(dec("1.24")));
    }

    #[test]
    fn test_zero_rates() {
        assert_eq!(FeeCalculator::withdrawal_fee(dec("250"), dec("0")), Decimal::zero());
        assert_eq!(FeeCalculator::creation_fee(dec("250"), dec("0")), Decimal::zero());
    }
}
