use crate::db::repo::{ClaimOutcome, DistributionClaim};
use crate::db::Repository;
use crate::domain::{
    derive_transaction_id, Account, Decimal, Dispute, DisputeId, DisputeStatus,
    DistributionResult, Escrow, EscrowId, EscrowStatus, GoalId, GoalOutcome, PayoutFailure,
    PayoutStatus, StakeId, StakeStatus, StakeholderPayout, TimeMs, TransactionKind,
    TransactionRecord, UserId,
};
use crate::engine::{FeeCalculator, ForfeitureDistributor, ForfeitureSplit};
use crate::notify::{notify_detached, Notifier};
use crate::orchestration::escrow::{EscrowError, EscrowLifecycleManager};
use crate::orchestration::recorder::{LedgerError, LedgerRecorder};
use crate::wallet::{WalletRequest, WalletService};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum DistributionError {
    #[error("No escrow for goal {0}")]
    EscrowNotFound(GoalId),
    #[error("Dispute not found: {0}")]
    DisputeNotFound(DisputeId),
    #[error("No outcome recorded for goal {0}")]
    OutcomeNotRecorded(GoalId),
    #[error("Distribution of escrow {escrow_id} is already in progress (claimed at {claimed_at})")]
    DistributionInProgress {
        escrow_id: EscrowId,
        claimed_at: TimeMs,
    },
    #[error("Distribution claim for escrow {0} was taken over by another attempt")]
    ClaimLost(EscrowId),
    #[error(transparent)]
    Escrow(#[from] EscrowError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// What happens to one stakeholder's share.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LegAction {
    /// Pay `share + bonus - withdrawal_fee` to the user's wallet.
    Release {
        withdrawal_fee: Decimal,
        bonus: Decimal,
    },
    /// Creation fee to platform fees, the split to charity and platform. The
    /// split's winners portion stays in escrow for the winners' bonuses.
    Forfeit {
        creation_fee: Decimal,
        split: ForfeitureSplit,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PayoutLeg {
    stake_id: StakeId,
    user_id: UserId,
    share: Decimal,
    action: LegAction,
}

impl PayoutLeg {
    fn is_winner(&self) -> bool {
        matches!(self.action, LegAction::Release { .. })
    }

    /// Amount the user's wallet receives.
    fn wallet_amount(&self) -> Decimal {
        match &self.action {
            LegAction::Release {
                withdrawal_fee,
                bonus,
            } => self.share + *bonus - *withdrawal_fee,
            LegAction::Forfeit { .. } => Decimal::zero(),
        }
    }

    fn transaction_id(&self, escrow_id: &EscrowId) -> String {
        let prefix = if self.is_winner() { "release" } else { "forfeit" };
        derive_transaction_id(prefix, &[escrow_id.as_str(), self.stake_id.as_str()])
    }

    fn ledger_record(
        &self,
        escrow_id: &EscrowId,
        payment_reference: Option<&str>,
        at: TimeMs,
    ) -> TransactionRecord {
        let escrow = Account::Escrow(escrow_id.clone());
        let stake_ref = Some(self.stake_id.as_str());
        let id = self.transaction_id(escrow_id);

        match &self.action {
            LegAction::Release {
                withdrawal_fee,
                bonus,
            } => TransactionRecord::new(id, TransactionKind::EscrowRelease, at)
                .debit(&escrow, self.share + *bonus, "escrow released", stake_ref)
                .credit(
                    &Account::Wallet(self.user_id.clone()),
                    self.wallet_amount(),
                    "stake payout",
                    payment_reference,
                )
                .credit(&Account::PlatformFees, *withdrawal_fee, "withdrawal fee", stake_ref),
            LegAction::Forfeit {
                creation_fee,
                split,
            } => TransactionRecord::new(id, TransactionKind::Forfeiture, at)
                .debit(&escrow, self.share - split.winners, "stake forfeited", stake_ref)
                .credit(&Account::PlatformFees, *creation_fee, "creation fee", stake_ref)
                .credit(&Account::Charity, split.charity, "forfeiture to charity", stake_ref)
                .credit(
                    &Account::PlatformRevenue,
                    split.platform,
                    "forfeiture to platform",
                    stake_ref,
                ),
        }
    }
}

/// Proportional shares of `pool`, each floored to the cent. The first
/// stakeholder takes the leftover cents, so no share is ever negative.
fn proportional_shares(escrow: &Escrow, pool: Decimal) -> Vec<Decimal> {
    let total = escrow.total_principal;
    let n = escrow.stakeholders.len();
    if !total.is_positive() || n == 0 {
        return vec![Decimal::zero(); n];
    }

    let pool = pool.non_negative();
    let mut shares: Vec<Decimal> = escrow
        .stakeholders
        .iter()
        .map(|holder| (holder.principal * pool / total).floor_money())
        .collect();
    let allocated: Decimal = shares.iter().copied().sum();
    shares[0] += pool - allocated;
    shares
}

/// Plan every stakeholder's leg for an outcome. Pure.
fn plan_distribution(
    escrow: &Escrow,
    outcome: &GoalOutcome,
    pool: Decimal,
    distributor: &ForfeitureDistributor,
) -> Vec<PayoutLeg> {
    let shares = proportional_shares(escrow, pool);
    let winner_count = escrow
        .stakeholders
        .iter()
        .filter(|s| outcome.is_winner(&s.user_id))
        .count();

    let mut legs: Vec<PayoutLeg> = escrow
        .stakeholders
        .iter()
        .zip(shares)
        .map(|(holder, share)| {
            let action = if outcome.is_winner(&holder.user_id) {
                LegAction::Release {
                    withdrawal_fee: FeeCalculator::withdrawal_fee(share, holder.fee_rate_on_withdrawal),
                    bonus: Decimal::zero(),
                }
            } else {
                let creation_fee =
                    FeeCalculator::creation_fee(holder.principal, holder.fee_rate_on_stake).min(share);
                let mut split = distributor.split(share - creation_fee, escrow.ownership, winner_count);
                if winner_count == 0 && !split.winners.is_zero() {
                    // Nobody can receive a winners' portion.
                    split.platform += split.winners;
                    split.winners = Decimal::zero();
                }
                LegAction::Forfeit {
                    creation_fee,
                    split,
                }
            };
            PayoutLeg {
                stake_id: holder.stake_id.clone(),
                user_id: holder.user_id.clone(),
                share,
                action,
            }
        })
        .collect();

    let retained: Decimal = legs
        .iter()
        .filter_map(|leg| match &leg.action {
            LegAction::Forfeit { split, .. } => Some(split.winners),
            LegAction::Release { .. } => None,
        })
        .sum();

    if retained.is_positive() {
        let mut bonuses = ForfeitureDistributor::divide_evenly(retained, winner_count).into_iter();
        for leg in legs.iter_mut() {
            if let LegAction::Release { bonus, .. } = &mut leg.action {
                *bonus = bonuses.next().unwrap_or_default();
            }
        }
    }

    legs
}

enum LegResult {
    Settled { transaction_id: Option<String> },
    Failed(PayoutFailure),
}

/// Settles goal escrows: shares, fees, forfeiture splits and payouts.
#[derive(Clone)]
pub struct DistributionOrchestrator {
    repo: Arc<Repository>,
    wallet: Arc<dyn WalletService>,
    recorder: Arc<LedgerRecorder>,
    escrows: EscrowLifecycleManager,
    distributor: ForfeitureDistributor,
    notifier: Arc<dyn Notifier>,
    lease_ms: i64,
}

impl DistributionOrchestrator {
    pub fn new(
        repo: Arc<Repository>,
        wallet: Arc<dyn WalletService>,
        recorder: Arc<LedgerRecorder>,
        distributor: ForfeitureDistributor,
        notifier: Arc<dyn Notifier>,
        lease_ms: i64,
    ) -> Self {
        let escrows = EscrowLifecycleManager::new(repo.clone(), wallet.clone(), recorder.clone());
        Self {
            repo,
            wallet,
            recorder,
            escrows,
            distributor,
            notifier,
            lease_ms,
        }
    }

    /// Record a goal's terminal outcome. The first recorded outcome wins.
    pub async fn record_outcome(
        &self,
        goal_id: &GoalId,
        outcome: &GoalOutcome,
    ) -> Result<GoalOutcome, DistributionError> {
        let stored = self
            .repo
            .record_goal_outcome(goal_id, outcome, TimeMs::now())
            .await?;
        if &stored != outcome {
            warn!(goal_id = %goal_id, "Outcome already recorded; keeping the first one");
        }
        Ok(stored)
    }

    /// Open a dispute against a goal. Distribution waits until it is resolved.
    pub async fn open_dispute(
        &self,
        goal_id: &GoalId,
        reason: &str,
    ) -> Result<Dispute, DistributionError> {
        let dispute = Dispute {
            id: DisputeId::generate(),
            goal_id: goal_id.clone(),
            status: DisputeStatus::Open,
            reason: reason.to_string(),
            opened_at: TimeMs::now(),
            resolved_at: None,
        };
        self.repo.insert_dispute(&dispute).await?;
        info!(goal_id = %goal_id, dispute_id = %dispute.id, "Dispute opened");
        Ok(dispute)
    }

    pub async fn resolve_dispute(&self, id: &DisputeId) -> Result<Dispute, DistributionError> {
        let dispute = self
            .repo
            .resolve_dispute(id, TimeMs::now())
            .await?
            .ok_or_else(|| DistributionError::DisputeNotFound(id.clone()))?;
        info!(goal_id = %dispute.goal_id, dispute_id = %id, "Dispute resolved");
        Ok(dispute)
    }

    /// Settle the escrow of a goal. Safe to call repeatedly.
    pub async fn distribute(&self, goal_id: &GoalId) -> Result<DistributionResult, DistributionError> {
        self.distribute_at(goal_id, TimeMs::now()).await
    }

    pub async fn distribute_at(
        &self,
        goal_id: &GoalId,
        now: TimeMs,
    ) -> Result<DistributionResult, DistributionError> {
        let escrow = self
            .repo
            .find_escrow_for_goal(goal_id)
            .await?
            .ok_or_else(|| DistributionError::EscrowNotFound(goal_id.clone()))?;

        let open_disputes = self
            .repo
            .list_disputes(goal_id)
            .await?
            .iter()
            .filter(|d| d.is_open())
            .count();
        // A settled escrow keeps answering with its stored result.
        let settled = matches!(
            escrow.status,
            EscrowStatus::Released | EscrowStatus::Forfeited
        );
        if open_disputes > 0 && !settled {
            if escrow.status == EscrowStatus::Held {
                self.escrows
                    .set_status(&escrow.id, EscrowStatus::PendingDistribution)
                    .await?;
            }
            info!(goal_id = %goal_id, open_disputes, "Distribution deferred by open disputes");
            return Ok(DistributionResult::pending(
                goal_id.clone(),
                escrow.id,
                open_disputes,
            ));
        }

        let outcome = self
            .repo
            .get_goal_outcome(goal_id)
            .await?
            .ok_or_else(|| DistributionError::OutcomeNotRecorded(goal_id.clone()))?;

        let claim = match self.repo.claim_distribution(&escrow, self.lease_ms, now).await? {
            ClaimOutcome::Acquired(claim) => claim,
            ClaimOutcome::Completed(result) => {
                info!(goal_id = %goal_id, escrow_id = %escrow.id, "Distribution already settled");
                return Ok(result);
            }
            ClaimOutcome::InProgress { claimed_at } => {
                return Err(DistributionError::DistributionInProgress {
                    escrow_id: escrow.id,
                    claimed_at,
                });
            }
        };

        // Stakeholders are fixed once claimed; reload so the plan matches
        // the frozen pool.
        let escrow = self
            .repo
            .get_escrow(&claim.escrow_id)
            .await?
            .ok_or_else(|| DistributionError::EscrowNotFound(goal_id.clone()))?;

        self.credit_accrual(&escrow, &claim, now).await?;

        let legs = plan_distribution(&escrow, &outcome, claim.pool, &self.distributor);
        let prior: HashMap<StakeId, StakeholderPayout> = self
            .repo
            .list_payouts(&escrow.id)
            .await?
            .into_iter()
            .map(|p| (p.stake_id.clone(), p))
            .collect();

        let results = join_all(
            legs.iter()
                .map(|leg| self.execute_leg(&escrow, leg, prior.get(&leg.stake_id), now)),
        )
        .await;

        let mut transaction_refs = Vec::new();
        let mut errors = Vec::new();
        let mut settled = Vec::new();
        for (leg, result) in legs.iter().zip(results) {
            match result {
                LegResult::Settled { transaction_id } => {
                    transaction_refs.extend(transaction_id);
                    let status = if leg.is_winner() {
                        StakeStatus::Completed
                    } else {
                        StakeStatus::Failed
                    };
                    settled.push((leg.stake_id.clone(), status));
                }
                LegResult::Failed(failure) => errors.push(failure),
            }
        }

        let partial = !errors.is_empty();
        let status = if partial {
            EscrowStatus::Partial
        } else if legs.iter().any(PayoutLeg::is_winner) {
            EscrowStatus::Released
        } else {
            EscrowStatus::Forfeited
        };

        self.escrows.set_status(&escrow.id, status).await?;

        let result = DistributionResult {
            goal_id: goal_id.clone(),
            escrow_id: escrow.id.clone(),
            status,
            transaction_refs,
            partial,
            errors,
            message: None,
        };

        if !self
            .repo
            .complete_distribution(&claim, &result, &settled, now)
            .await?
        {
            return Err(DistributionError::ClaimLost(escrow.id));
        }

        info!(
            goal_id = %goal_id,
            escrow_id = %escrow.id,
            status = %status,
            attempt = claim.attempt,
            transactions = result.transaction_refs.len(),
            failures = result.errors.len(),
            "Distribution settled"
        );
        notify_detached(self.notifier.clone(), result.clone());
        Ok(result)
    }

    /// Post the frozen accrual into the escrow account so the escrow nets to
    /// zero once every share is paid out.
    async fn credit_accrual(
        &self,
        escrow: &Escrow,
        claim: &DistributionClaim,
        now: TimeMs,
    ) -> Result<(), DistributionError> {
        let accrued = claim.pool - escrow.total_principal;
        if !accrued.is_positive() {
            return Ok(());
        }

        let record = TransactionRecord::new(
            derive_transaction_id("accrual", &[escrow.id.as_str()]),
            TransactionKind::Payment,
            now,
        )
        .debit(&Account::Clearing, accrued, "accrued interest", Some(escrow.id.as_str()))
        .credit(
            &Account::Escrow(escrow.id.clone()),
            accrued,
            "accrued interest",
            Some(escrow.id.as_str()),
        );

        match self.recorder.record(record).await {
            Ok(_) | Err(LedgerError::AlreadyCommitted(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn execute_leg(
        &self,
        escrow: &Escrow,
        leg: &PayoutLeg,
        prior: Option<&StakeholderPayout>,
        now: TimeMs,
    ) -> LegResult {
        if let Some(paid) = prior.filter(|p| p.status == PayoutStatus::Paid) {
            return LegResult::Settled {
                transaction_id: paid.transaction_id.clone(),
            };
        }

        let transaction_id = leg.transaction_id(&escrow.id);
        let amount = leg.wallet_amount();
        let failure = |message: String| {
            LegResult::Failed(PayoutFailure {
                stake_id: leg.stake_id.clone(),
                user_id: leg.user_id.clone(),
                amount,
                message,
            })
        };

        let payment_reference = match prior.filter(|p| p.status == PayoutStatus::Sent) {
            Some(sent) => sent.payment_reference.clone(),
            None if leg.is_winner() && amount.is_positive() => {
                let request = WalletRequest {
                    amount,
                    user_id: leg.user_id.clone(),
                    goal_id: escrow.goal_id.clone(),
                    idempotency_key: transaction_id.clone(),
                };
                match self.wallet.release_escrow(&request).await {
                    Ok(reference) => {
                        if let Err(e) = self
                            .repo
                            .mark_payout_sent(
                                &escrow.id,
                                &leg.stake_id,
                                &leg.user_id,
                                amount,
                                reference.as_str(),
                                now,
                            )
                            .await
                        {
                            warn!(stake_id = %leg.stake_id, error = %e, "Failed to record sent payout");
                        }
                        Some(reference.0)
                    }
                    Err(e) => {
                        warn!(
                            escrow_id = %escrow.id,
                            stake_id = %leg.stake_id,
                            user_id = %leg.user_id,
                            amount = %amount,
                            error = %e,
                            "Stakeholder payout failed"
                        );
                        if let Err(db) = self
                            .repo
                            .mark_payout_failed(
                                &escrow.id,
                                &leg.stake_id,
                                &leg.user_id,
                                amount,
                                &e.to_string(),
                                now,
                            )
                            .await
                        {
                            warn!(stake_id = %leg.stake_id, error = %db, "Failed to record payout failure");
                        }
                        return failure(e.to_string());
                    }
                }
            }
            None => None,
        };

        let record = leg.ledger_record(&escrow.id, payment_reference.as_deref(), now);
        if record.entries.is_empty() {
            return LegResult::Settled {
                transaction_id: None,
            };
        }

        let payout = StakeholderPayout {
            escrow_id: escrow.id.clone(),
            stake_id: leg.stake_id.clone(),
            user_id: leg.user_id.clone(),
            amount: if leg.is_winner() { amount } else { leg.share },
            status: PayoutStatus::Paid,
            payment_reference,
            transaction_id: Some(transaction_id.clone()),
            error: None,
            updated_at: now,
        };
        match self.recorder.record_payout(&record, &payout).await {
            Ok(()) => LegResult::Settled {
                transaction_id: Some(transaction_id),
            },
            Err(e) => {
                warn!(stake_id = %leg.stake_id, error = %e, "Ledger commit for payout failed");
                failure(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OwnershipClass, Stakeholder};
    use crate::engine::ForfeitureConfig;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn escrow(ownership: OwnershipClass, principals: &[&str], accrued: &str) -> Escrow {
        let stakeholders: Vec<Stakeholder> = principals
            .iter()
            .enumerate()
            .map(|(i, p)| Stakeholder {
                stake_id: StakeId::new(format!("s{}", i + 1)),
                user_id: UserId::new(format!("u{}", i + 1)),
                principal: dec(p),
                fee_rate_on_stake: dec("0.05"),
                fee_rate_on_withdrawal: dec("0.01"),
            })
            .collect();
        Escrow {
            id: EscrowId::new("e1"),
            goal_id: GoalId::new("g1"),
            ownership,
            total_principal: stakeholders.iter().map(|s| s.principal).sum(),
            accrued_amount: dec(accrued),
            stakeholders,
            status: EscrowStatus::Held,
            created_at: TimeMs::new(0),
            updated_at: TimeMs::new(0),
        }
    }

    fn distributor() -> ForfeitureDistributor {
        ForfeitureDistributor::new(ForfeitureConfig::default())
    }

    #[test]
    fn test_shares_sum_to_pool() {
        let e = escrow(OwnershipClass::Group, &["100", "100", "100"], "0");
        let shares = proportional_shares(&e, dec("100"));
        assert_eq!(shares, vec![dec("33.34"), dec("33.33"), dec("33.33")]);
        assert_eq!(shares.iter().copied().sum::<Decimal>(), dec("100"));
    }

    #[test]
    fn test_small_stakeholder_share_is_never_negative() {
        let e = escrow(
            OwnershipClass::Group,
            &["1", "1", "1", "1", "1", "0.01"],
            "0.03",
        );
        let shares = proportional_shares(&e, dec("5.04"));
        assert!(shares.iter().all(|s| !s.is_negative()));
        assert_eq!(shares.iter().copied().sum::<Decimal>(), dec("5.04"));
        assert_eq!(shares[5], dec("0.01"));

        let outcome = GoalOutcome::Group {
            winners: (1..=6).map(|i| UserId::new(format!("u{}", i))).collect(),
        };
        let legs = plan_distribution(&e, &outcome, dec("5.04"), &distributor());
        for leg in &legs {
            assert!(!leg.share.is_negative());
            let record = leg.ledger_record(&e.id, Some("pay"), TimeMs::new(0));
            assert!(record.is_balanced());
            assert!(record.entries.iter().all(|entry| !entry.amount.is_negative()));
        }
    }

    #[test]
    fn test_zero_total_principal_gives_zero_shares() {
        let mut e = escrow(OwnershipClass::Individual, &["100"], "0");
        e.total_principal = Decimal::zero();
        assert_eq!(proportional_shares(&e, dec("112")), vec![Decimal::zero()]);
    }

    #[test]
    fn test_individual_success_plan() {
        let e = escrow(OwnershipClass::Individual, &["100"], "12");
        let legs = plan_distribution(&e, &GoalOutcome::Succeeded, dec("112"), &distributor());

        assert_eq!(legs.len(), 1);
        assert_eq!(legs[0].share, dec("112"));
        assert_eq!(legs[0].wallet_amount(), dec("110.88"));
        let record = legs[0].ledger_record(&e.id, Some("pay_1"), TimeMs::new(0));
        assert!(record.is_balanced());
    }

    #[test]
    fn test_individual_failure_plan() {
        let e = escrow(OwnershipClass::Individual, &["100"], "12");
        let legs = plan_distribution(&e, &GoalOutcome::Failed, dec("112"), &distributor());

        match &legs[0].action {
            LegAction::Forfeit {
                creation_fee,
                split,
            } => {
                assert_eq!(*creation_fee, dec("5"));
                assert_eq!(split.charity, dec("53.5"));
                assert_eq!(split.platform, dec("53.5"));
                assert_eq!(split.winners, Decimal::zero());
            }
            other => panic!("expected forfeit, got {:?}", other),
        }
        assert!(legs[0].ledger_record(&e.id, None, TimeMs::new(0)).is_balanced());
    }

    #[test]
    fn test_group_forfeiture_plan() {
        let e = escrow(OwnershipClass::Group, &["100", "100", "100"], "0");
        let outcome = GoalOutcome::Group {
            winners: vec![UserId::new("u1")],
        };
        let legs = plan_distribution(&e, &outcome, dec("300"), &distributor());

        let mut charity = Decimal::zero();
        let mut platform = Decimal::zero();
        let mut retained = Decimal::zero();
        for leg in &legs[1..] {
            match &leg.action {
                LegAction::Forfeit { split, .. } => {
                    charity += split.charity;
                    platform += split.platform;
                    retained += split.winners;
                }
                other => panic!("expected forfeit, got {:?}", other),
            }
        }
        assert_eq!(charity, dec("57"));
        assert_eq!(platform, dec("38"));
        assert_eq!(retained, dec("95"));

        match &legs[0].action {
            LegAction::Release { bonus, withdrawal_fee } => {
                assert_eq!(*bonus, dec("95"));
                assert_eq!(*withdrawal_fee, dec("1"));
            }
            other => panic!("expected release, got {:?}", other),
        }

        // Escrow debits across all legs equal the pool.
        let debited: Decimal = legs
            .iter()
            .map(|leg| leg.ledger_record(&e.id, None, TimeMs::new(0)).total_debits())
            .sum();
        assert_eq!(debited, dec("300"));
    }

    #[test]
    fn test_group_with_no_winners_keeps_nothing_in_escrow() {
        let e = escrow(OwnershipClass::Group, &["100", "100"], "0");
        let outcome = GoalOutcome::Group { winners: vec![] };
        let legs = plan_distribution(&e, &outcome, dec("200"), &distributor());

        for leg in &legs {
            let record = leg.ledger_record(&e.id, None, TimeMs::new(0));
            assert!(record.is_balanced());
            assert_eq!(record.total_debits(), leg.share);
        }
    }

    #[test]
    fn test_bonus_remainder_goes_to_first_winner() {
        let e = escrow(OwnershipClass::Group, &["100", "100", "100", "100"], "0");
        let outcome = GoalOutcome::Group {
            winners: vec![UserId::new("u1"), UserId::new("u2"), UserId::new("u3")],
        };
        let legs = plan_distribution(&e, &outcome, dec("400"), &distributor());

        let bonuses: Vec<Decimal> = legs
            .iter()
            .filter_map(|leg| match &leg.action {
                LegAction::Release { bonus, .. } => Some(*bonus),
                LegAction::Forfeit { .. } => None,
            })
            .collect();
        // One loser: net 95, winners portion 47.5 split three ways.
        assert_eq!(bonuses, vec![dec("15.84"), dec("15.83"), dec("15.83")]);
    }

    #[test]
    fn test_transaction_ids_are_stable() {
        let e = escrow(OwnershipClass::Individual, &["100"], "0");
        let a = plan_distribution(&e, &GoalOutcome::Succeeded, dec("100"), &distributor());
        let b = plan_distribution(&e, &GoalOutcome::Succeeded, dec("100"), &distributor());
        assert_eq!(a[0].transaction_id(&e.id), b[0].transaction_id(&e.id));
        assert!(a[0].transaction_id(&e.id).starts_with("release:"));
    }
}
