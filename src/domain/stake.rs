//! Stake records and their rate / accrual policies.

use crate::domain::{Decimal, GoalId, StakeId, TimeMs, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One point of a piecewise-constant APR schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatePoint {
    pub effective_from: TimeMs,
    pub apr: Decimal,
}

/// Principal threshold for a tiered APR.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AprTier {
    pub min_principal: Decimal,
    pub apr: Decimal,
}

/// How the annual rate of a stake is determined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum AprModel {
    #[serde(rename_all = "camelCase")]
    Fixed { apr: Decimal },
    #[serde(rename_all = "camelCase")]
    Tiered { tiers: Vec<AprTier> },
    #[serde(rename_all = "camelCase")]
    Dynamic { schedule: Vec<RatePoint> },
    #[serde(rename_all = "camelCase")]
    Promotional {
        promo_apr: Decimal,
        promo_until: TimeMs,
        base_apr: Decimal,
    },
}

/// A span of time accruing at a single APR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateSegment {
    pub from: TimeMs,
    pub to: TimeMs,
    pub apr: Decimal,
}

impl AprModel {
    /// Split `[from, to)` into consecutive constant-rate segments.
    ///
    /// Returns an empty list when `to <= from`.
    pub fn segments(&self, principal: Decimal, from: TimeMs, to: TimeMs) -> Vec<RateSegment> {
        if to <= from {
            return Vec::new();
        }
        match self {
            AprModel::Fixed { apr } => vec![RateSegment { from, to, apr: *apr }],
            AprModel::Tiered { tiers } => {
                let apr = tiers
                    .iter()
                    .filter(|t| t.min_principal <= principal)
                    .max_by(|a, b| a.min_principal.cmp(&b.min_principal))
                    .map(|t| t.apr)
                    .unwrap_or_default();
                vec![RateSegment { from, to, apr }]
            }
            AprModel::Promotional {
                promo_apr,
                promo_until,
                base_apr,
            } => {
                let split = (*promo_until).clamp(from, to);
                let mut out = Vec::with_capacity(2);
                if split > from {
                    out.push(RateSegment {
                        from,
                        to: split,
                        apr: *promo_apr,
                    });
                }
                if to > split {
                    out.push(RateSegment {
                        from: split,
                        to,
                        apr: *base_apr,
                    });
                }
                out
            }
            AprModel::Dynamic { schedule } => dynamic_segments(schedule, from, to),
        }
    }

    fn rates(&self) -> Vec<Decimal> {
        match self {
            AprModel::Fixed { apr } => vec![*apr],
            AprModel::Tiered { tiers } => tiers.iter().map(|t| t.apr).collect(),
            AprModel::Dynamic { schedule } => schedule.iter().map(|p| p.apr).collect(),
            AprModel::Promotional {
                promo_apr,
                base_apr,
                ..
            } => vec![*promo_apr, *base_apr],
        }
    }
}

fn dynamic_segments(schedule: &[RatePoint], from: TimeMs, to: TimeMs) -> Vec<RateSegment> {
    let mut points: Vec<&RatePoint> = schedule.iter().collect();
    points.sort_by_key(|p| p.effective_from);

    let Some(first) = points.first() else {
        return Vec::new();
    };

    // Rate in force at `from`: the last point at or before it, else the first point.
    let mut current_apr = points
        .iter()
        .rev()
        .find(|p| p.effective_from <= from)
        .map(|p| p.apr)
        .unwrap_or(first.apr);

    let mut out = Vec::new();
    let mut cursor = from;
    for point in points
        .iter()
        .filter(|p| p.effective_from > from && p.effective_from < to)
    {
        out.push(RateSegment {
            from: cursor,
            to: point.effective_from,
            apr: current_apr,
        });
        cursor = point.effective_from;
        current_apr = point.apr;
    }
    out.push(RateSegment {
        from: cursor,
        to,
        apr: current_apr,
    });
    out
}

/// Interest convention for a stake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum AccrualMethod {
    Simple,
    #[serde(rename_all = "camelCase")]
    Compound { period_days: u32 },
}

/// Lifecycle status of a stake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StakeStatus {
    Active,
    PendingLiquidation,
    Completed,
    Failed,
    Liquidated,
}

impl StakeStatus {
    /// Statuses in which the accrued amount may still grow.
    pub const ACCRUAL_ELIGIBLE: [StakeStatus; 2] =
        [StakeStatus::Active, StakeStatus::PendingLiquidation];

    pub fn is_accrual_eligible(&self) -> bool {
        Self::ACCRUAL_ELIGIBLE.contains(self)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StakeStatus::Active => "active",
            StakeStatus::PendingLiquidation => "pendingLiquidation",
            StakeStatus::Completed => "completed",
            StakeStatus::Failed => "failed",
            StakeStatus::Liquidated => "liquidated",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(StakeStatus::Active),
            "pendingLiquidation" => Some(StakeStatus::PendingLiquidation),
            "completed" => Some(StakeStatus::Completed),
            "failed" => Some(StakeStatus::Failed),
            "liquidated" => Some(StakeStatus::Liquidated),
            _ => None,
        }
    }
}

impl std::fmt::Display for StakeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StakeValidationError {
    #[error("principal must be positive, got {0}")]
    NonPositivePrincipal(Decimal),
    #[error("rate {name} must be within [0, 1], got {value}")]
    RateOutOfRange { name: &'static str, value: Decimal },
    #[error("compounding period must be at least one day")]
    ZeroCompoundingPeriod,
    #[error("deadline {deadline} is before start {start}")]
    DeadlineBeforeStart { start: TimeMs, deadline: TimeMs },
}

/// A user's pledge against a goal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stake {
    pub id: StakeId,
    pub goal_id: GoalId,
    pub user_id: UserId,
    pub principal: Decimal,
    pub apr_model: AprModel,
    pub accrual_method: AccrualMethod,
    pub fee_rate_on_stake: Decimal,
    pub fee_rate_on_withdrawal: Decimal,
    pub accrued_amount: Decimal,
    pub status: StakeStatus,
    pub start_at: TimeMs,
    pub last_accrual_at: TimeMs,
    pub deadline: TimeMs,
}

impl Stake {
    /// Check the numeric preconditions every calculator relies on.
    pub fn validate(&self) -> Result<(), StakeValidationError> {
        if !self.principal.is_positive() {
            return Err(StakeValidationError::NonPositivePrincipal(self.principal));
        }
        for apr in self.apr_model.rates() {
            if !apr.is_unit_rate() {
                return Err(StakeValidationError::RateOutOfRange {
                    name: "apr",
                    value: apr,
                });
            }
        }
        for (name, value) in [
            ("feeRateOnStake", self.fee_rate_on_stake),
            ("feeRateOnWithdrawal", self.fee_rate_on_withdrawal),
        ] {
            if !value.is_unit_rate() {
                return Err(StakeValidationError::RateOutOfRange { name, value });
            }
        }
        if let AccrualMethod::Compound { period_days: 0 } = self.accrual_method {
            return Err(StakeValidationError::ZeroCompoundingPeriod);
        }
        if self.deadline < self.start_at {
            return Err(StakeValidationError::DeadlineBeforeStart {
                start: self.start_at,
                deadline: self.deadline,
            });
        }
        Ok(())
    }

    /// Principal plus everything accrued so far.
    pub fn current_value(&self) -> Decimal {
        self.principal + self.accrued_amount
    }
}
