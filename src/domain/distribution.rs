//! Goal outcomes and the immutable record of a distribution attempt.

use crate::domain::{Decimal, EscrowId, EscrowStatus, GoalId, StakeId, TimeMs, UserId};
use serde::{Deserialize, Serialize};

/// Terminal outcome of a goal, recorded once before distribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum GoalOutcome {
    /// Every stakeholder met the goal.
    Succeeded,
    /// Every stakeholder missed the goal.
    Failed,
    /// Group goal: listed users won, every other stakeholder forfeits.
    Group { winners: Vec<UserId> },
}

impl GoalOutcome {
    pub fn is_winner(&self, user: &UserId) -> bool {
        match self {
            GoalOutcome::Succeeded => true,
            GoalOutcome::Failed => false,
            GoalOutcome::Group { winners } => winners.contains(user),
        }
    }
}

/// A stakeholder payout that did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutFailure {
    pub stake_id: StakeId,
    pub user_id: UserId,
    pub amount: Decimal,
    pub message: String,
}

/// Progress of one stakeholder's payout within an escrow distribution.
///
/// `sent` means the wallet accepted the transfer but the ledger transaction
/// is not yet committed; a retry only commits the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayoutStatus {
    Sent,
    Paid,
    Failed,
}

impl PayoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutStatus::Sent => "sent",
            PayoutStatus::Paid => "paid",
            PayoutStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sent" => Some(PayoutStatus::Sent),
            "paid" => Some(PayoutStatus::Paid),
            "failed" => Some(PayoutStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakeholderPayout {
    pub escrow_id: EscrowId,
    pub stake_id: StakeId,
    pub user_id: UserId,
    pub amount: Decimal,
    pub status: PayoutStatus,
    pub payment_reference: Option<String>,
    pub transaction_id: Option<String>,
    pub error: Option<String>,
    pub updated_at: TimeMs,
}

/// Outcome of one `distribute` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionResult {
    pub goal_id: GoalId,
    pub escrow_id: EscrowId,
    pub status: EscrowStatus,
    /// Ledger transaction ids committed for this escrow, in stakeholder order.
    pub transaction_refs: Vec<String>,
    pub partial: bool,
    pub errors: Vec<PayoutFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl DistributionResult {
    /// Result for a distribution deferred by an open dispute.
    pub fn pending(goal_id: GoalId, escrow_id: EscrowId, open_disputes: usize) -> Self {
        Self {
            goal_id,
            escrow_id,
            status: EscrowStatus::PendingDistribution,
            transaction_refs: Vec::new(),
            partial: false,
            errors: Vec::new(),
            message: Some(format!(
                "distribution deferred: {} open dispute(s)",
                open_disputes
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_winner() {
        let alice = UserId::new("alice");
        let bob = UserId::new("bob");
        assert!(GoalOutcome::Succeeded.is_winner(&alice));
        assert!(!GoalOutcome::Failed.is_winner(&alice));
        let group = GoalOutcome::Group {
            winners: vec![alice.clone()],
        };
        assert!(group.is_winner(&alice));
        assert!(!group.is_winner(&bob));
    }

    #[test]
    fn test_outcome_json() {
        let outcome: GoalOutcome = serde_json::from_value(serde_json::json!({
            "kind": "group",
            "winners": ["u1", "u2"]
        }))
        .unwrap();
        assert_eq!(
            outcome,
            GoalOutcome::Group {
                winners: vec![UserId::new("u1"), UserId::new("u2")]
            }
        );
        assert_eq!(
            serde_json::to_value(GoalOutcome::Succeeded).unwrap(),
            serde_json::json!({"kind": "succeeded"})
        );
    }

    #[test]
    fn test_pending_result() {
        let result = DistributionResult::pending(GoalId::new("g"), EscrowId::new("e"), 2);
        assert_eq!(result.status, EscrowStatus::PendingDistribution);
        assert!(result.transaction_refs.is_empty());
        assert!(!result.partial);
    }
}
