//! Escrow records: funds held for a goal until it reaches an outcome.

use crate::domain::{Decimal, EscrowId, GoalId, StakeId, TimeMs, UserId};
use serde::{Deserialize, Serialize};

/// Who owns the goal; selects the forfeiture split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OwnershipClass {
    Individual,
    Corporate,
    Group,
}

impl OwnershipClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            OwnershipClass::Individual => "individual",
            OwnershipClass::Corporate => "corporate",
            OwnershipClass::Group => "group",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "individual" => Some(OwnershipClass::Individual),
            "corporate" => Some(OwnershipClass::Corporate),
            "group" => Some(OwnershipClass::Group),
            _ => None,
        }
    }
}

/// Escrow state machine.
///
/// ```text
/// held ──> released | forfeited | partial | pendingDistribution
/// pendingDistribution ──> held | released | forfeited | partial
/// partial ──> released | forfeited | partial
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EscrowStatus {
    Held,
    Released,
    Forfeited,
    Partial,
    PendingDistribution,
}

impl EscrowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscrowStatus::Held => "held",
            EscrowStatus::Released => "released",
            EscrowStatus::Forfeited => "forfeited",
            EscrowStatus::Partial => "partial",
            EscrowStatus::PendingDistribution => "pendingDistribution",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "held" => Some(EscrowStatus::Held),
            "released" => Some(EscrowStatus::Released),
            "forfeited" => Some(EscrowStatus::Forfeited),
            "partial" => Some(EscrowStatus::Partial),
            "pendingDistribution" => Some(EscrowStatus::PendingDistribution),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EscrowStatus::Released | EscrowStatus::Forfeited | EscrowStatus::Partial
        )
    }

    /// Whether `self -> next` is a legal transition. Same-state moves are
    /// always allowed so reconciliation can be repeated.
    pub fn can_transition_to(&self, next: EscrowStatus) -> bool {
        use EscrowStatus::*;
        if *self == next {
            return true;
        }
        match self {
            Held => true,
            PendingDistribution => true,
            Partial => matches!(next, Released | Forfeited),
            Released | Forfeited => false,
        }
    }

    /// Status after recording a payout instruction of `kind`.
    ///
    /// Mixed release/forfeit instructions settle as `released`; a partial
    /// escrow stays partial until explicitly reconciled.
    pub fn after_instruction(&self, kind: InstructionKind) -> EscrowStatus {
        use EscrowStatus::*;
        let target = match kind {
            InstructionKind::Release | InstructionKind::Refund => Released,
            InstructionKind::Forfeit => Forfeited,
        };
        match self {
            Held | PendingDistribution => target,
            Partial => Partial,
            Released | Forfeited if *self == target => target,
            Released | Forfeited => Released,
        }
    }
}

impl std::fmt::Display for EscrowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of payout instruction recorded against an escrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InstructionKind {
    Release,
    Forfeit,
    Refund,
}

impl InstructionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstructionKind::Release => "release",
            InstructionKind::Forfeit => "forfeit",
            InstructionKind::Refund => "refund",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "release" => Some(InstructionKind::Release),
            "forfeit" => Some(InstructionKind::Forfeit),
            "refund" => Some(InstructionKind::Refund),
            _ => None,
        }
    }
}

/// One principal-contributing party of an escrow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stakeholder {
    pub stake_id: StakeId,
    pub user_id: UserId,
    pub principal: Decimal,
    pub fee_rate_on_stake: Decimal,
    pub fee_rate_on_withdrawal: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Escrow {
    pub id: EscrowId,
    pub goal_id: GoalId,
    pub ownership: OwnershipClass,
    pub total_principal: Decimal,
    pub accrued_amount: Decimal,
    pub stakeholders: Vec<Stakeholder>,
    pub status: EscrowStatus,
    pub created_at: TimeMs,
    pub updated_at: TimeMs,
}

impl Escrow {
    /// Principal plus accrual: what the escrow can pay out.
    pub fn payable_pool(&self) -> Decimal {
        self.total_principal + self.accrued_amount
    }

    /// Sum of stakeholder principals equals the recorded total.
    pub fn principal_is_consistent(&self) -> bool {
        let sum: Decimal = self.stakeholders.iter().map(|s| s.principal).sum();
        sum == self.total_principal
    }

    /// Deterministic idempotency key for distributing this escrow.
    pub fn distribution_key(&self) -> String {
        format!("dist_{}", self.id)
    }
}
