//! Disputes, goal outcomes, distribution claims and per-stakeholder payouts.

use crate::domain::{
    Decimal, Dispute, DisputeId, DisputeStatus, DistributionResult, Escrow, EscrowId, GoalId,
    GoalOutcome, PayoutStatus, StakeId, StakeStatus, StakeholderPayout, TimeMs,
    TransactionRecord, UserId,
};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::info;

use super::ledger::insert_transaction_conn;
use super::{decode_error, get_decimal, get_enum, get_time, Repository};

const STATE_IN_PROGRESS: &str = "inProgress";
const STATE_PARTIAL: &str = "partial";

/// Ownership of one distribution attempt for an escrow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionClaim {
    pub key: String,
    pub escrow_id: EscrowId,
    pub goal_id: GoalId,
    /// Payable pool frozen when the key was first claimed.
    pub pool: Decimal,
    /// Increments on every takeover; only the current attempt may settle.
    pub attempt: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This caller owns the attempt and must run the payouts.
    Acquired(DistributionClaim),
    /// A previous attempt settled the escrow; its result is returned as is.
    Completed(DistributionResult),
    /// Another attempt holds a live lease.
    InProgress { claimed_at: TimeMs },
}

fn dispute_from_row(row: &SqliteRow) -> Result<Dispute, sqlx::Error> {
    Ok(Dispute {
        id: DisputeId::new(row.try_get::<String, _>("id")?),
        goal_id: GoalId::new(row.try_get::<String, _>("goal_id")?),
        status: get_enum(row, "status", DisputeStatus::parse)?,
        reason: row.try_get("reason")?,
        opened_at: get_time(row, "opened_at")?,
        resolved_at: row.try_get::<Option<i64>, _>("resolved_at")?.map(TimeMs::new),
    })
}

fn payout_from_row(row: &SqliteRow) -> Result<StakeholderPayout, sqlx::Error> {
    Ok(StakeholderPayout {
        escrow_id: EscrowId::new(row.try_get::<String, _>("escrow_id")?),
        stake_id: StakeId::new(row.try_get::<String, _>("stake_id")?),
        user_id: UserId::new(row.try_get::<String, _>("user_id")?),
        amount: get_decimal(row, "amount")?,
        status: get_enum(row, "status", PayoutStatus::parse)?,
        payment_reference: row.try_get("payment_reference")?,
        transaction_id: row.try_get("transaction_id")?,
        error: row.try_get("error")?,
        updated_at: get_time(row, "updated_at")?,
    })
}

impl Repository {
    // =========================================================================
    // Disputes
    // =========================================================================

    pub async fn insert_dispute(&self, dispute: &Dispute) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO disputes (id, goal_id, status, reason, opened_at, resolved_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(dispute.id.as_str())
        .bind(dispute.goal_id.as_str())
        .bind(dispute.status.as_str())
        .bind(&dispute.reason)
        .bind(dispute.opened_at.as_ms())
        .bind(dispute.resolved_at.map(|t| t.as_ms()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_dispute(&self, id: &DisputeId) -> Result<Option<Dispute>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT id, goal_id, status, reason, opened_at, resolved_at FROM disputes WHERE id = ?",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(dispute_from_row).transpose()
    }

    /// Resolve an open dispute. Resolving twice keeps the first resolution time.
    pub async fn resolve_dispute(
        &self,
        id: &DisputeId,
        now: TimeMs,
    ) -> Result<Option<Dispute>, sqlx::Error> {
        sqlx::query("UPDATE disputes SET status = 'resolved', resolved_at = ? WHERE id = ? AND status = 'open'")
            .bind(now.as_ms())
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;

        self.get_dispute(id).await
    }

    pub async fn list_disputes(&self, goal_id: &GoalId) -> Result<Vec<Dispute>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, goal_id, status, reason, opened_at, resolved_at
            FROM disputes
            WHERE goal_id = ?
            ORDER BY opened_at ASC, id ASC
            "#,
        )
        .bind(goal_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(dispute_from_row).collect()
    }

    // =========================================================================
    // Goal outcomes
    // =========================================================================

    /// Record a goal's outcome. The first write wins; the stored outcome is
    /// returned either way.
    pub async fn record_goal_outcome(
        &self,
        goal_id: &GoalId,
        outcome: &GoalOutcome,
        now: TimeMs,
    ) -> Result<GoalOutcome, sqlx::Error> {
        let json = serde_json::to_string(outcome)
            .map_err(|e| decode_error(format!("cannot encode outcome: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO goal_outcomes (goal_id, outcome, recorded_at)
            VALUES (?, ?, ?)
            ON CONFLICT(goal_id) DO NOTHING
            "#,
        )
        .bind(goal_id.as_str())
        .bind(json)
        .bind(now.as_ms())
        .execute(&self.pool)
        .await?;

        self.get_goal_outcome(goal_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn get_goal_outcome(&self, goal_id: &GoalId) -> Result<Option<GoalOutcome>, sqlx::Error> {
        let row = sqlx::query("SELECT outcome FROM goal_outcomes WHERE goal_id = ?")
            .bind(goal_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            None => Ok(None),
            Some(row) => {
                let json: String = row.try_get("outcome")?;
                serde_json::from_str(&json)
                    .map(Some)
                    .map_err(|e| decode_error(format!("invalid stored outcome: {}", e)))
            }
        }
    }

    // =========================================================================
    // Distribution claims
    // =========================================================================

    /// Atomically claim the distribution of an escrow.
    ///
    /// A new claim freezes the payable pool read inside the same sqlite
    /// transaction. A `partial` claim, or an `inProgress` claim older than
    /// `lease_ms`, is taken over by bumping its attempt counter.
    pub async fn claim_distribution(
        &self,
        escrow: &Escrow,
        lease_ms: i64,
        now: TimeMs,
    ) -> Result<ClaimOutcome, sqlx::Error> {
        let key = escrow.distribution_key();
        let mut tx = self.pool.begin().await?;

        // Take the write lock before reading so the pool and claim state
        // cannot change underneath us.
        let touched = sqlx::query("UPDATE escrows SET updated_at = updated_at WHERE id = ?")
            .bind(escrow.id.as_str())
            .execute(&mut *tx)
            .await?;
        if touched.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }

        let existing = sqlx::query(
            r#"
            SELECT pool, state, attempt, claimed_at, result
            FROM distribution_claims
            WHERE idempotency_key = ?
            "#,
        )
        .bind(&key)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = existing else {
            let current = sqlx::query("SELECT total_principal, accrued_amount FROM escrows WHERE id = ?")
                .bind(escrow.id.as_str())
                .fetch_one(&mut *tx)
                .await?;
            let pool = get_decimal(&current, "total_principal")? + get_decimal(&current, "accrued_amount")?;

            sqlx::query(
                r#"
                INSERT INTO distribution_claims (
                    idempotency_key, escrow_id, goal_id, pool, state, attempt, claimed_at
                ) VALUES (?, ?, ?, ?, ?, 1, ?)
                "#,
            )
            .bind(&key)
            .bind(escrow.id.as_str())
            .bind(escrow.goal_id.as_str())
            .bind(pool.to_canonical_string())
            .bind(STATE_IN_PROGRESS)
            .bind(now.as_ms())
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;

            info!(escrow_id = %escrow.id, pool = %pool, "Distribution claimed");
            return Ok(ClaimOutcome::Acquired(DistributionClaim {
                key,
                escrow_id: escrow.id.clone(),
                goal_id: escrow.goal_id.clone(),
                pool,
                attempt: 1,
            }));
        };

        let state: String = row.try_get("state")?;
        let attempt: i64 = row.try_get("attempt")?;
        let claimed_at = get_time(&row, "claimed_at")?;

        let takeover = match state.as_str() {
            STATE_PARTIAL => true,
            STATE_IN_PROGRESS => now.millis_since(claimed_at) >= lease_ms,
            _ => {
                let json: Option<String> = row.try_get("result")?;
                let json = json.ok_or_else(|| decode_error(format!("claim {} has no result", key)))?;
                let result = serde_json::from_str(&json)
                    .map_err(|e| decode_error(format!("invalid stored result: {}", e)))?;
                return Ok(ClaimOutcome::Completed(result));
            }
        };

        if !takeover {
            return Ok(ClaimOutcome::InProgress { claimed_at });
        }

        let updated = sqlx::query(
            r#"
            UPDATE distribution_claims
            SET state = ?, attempt = attempt + 1, claimed_at = ?
            WHERE idempotency_key = ? AND attempt = ?
            "#,
        )
        .bind(STATE_IN_PROGRESS)
        .bind(now.as_ms())
        .bind(&key)
        .bind(attempt)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Ok(ClaimOutcome::InProgress { claimed_at });
        }
        tx.commit().await?;

        info!(escrow_id = %escrow.id, attempt = attempt + 1, previous_state = %state, "Distribution claim taken over");
        Ok(ClaimOutcome::Acquired(DistributionClaim {
            key,
            escrow_id: escrow.id.clone(),
            goal_id: escrow.goal_id.clone(),
            pool: get_decimal(&row, "pool")?,
            attempt: attempt + 1,
        }))
    }

    /// Persist the result of an attempt and settle the stakes it paid.
    ///
    /// Returns false (writing nothing) if the claim was taken over meanwhile.
    pub async fn complete_distribution(
        &self,
        claim: &DistributionClaim,
        result: &DistributionResult,
        settled_stakes: &[(StakeId, StakeStatus)],
        now: TimeMs,
    ) -> Result<bool, sqlx::Error> {
        let state = if result.partial {
            STATE_PARTIAL
        } else {
            result.status.as_str()
        };
        let json = serde_json::to_string(result)
            .map_err(|e| decode_error(format!("cannot encode result: {}", e)))?;

        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query(
            r#"
            UPDATE distribution_claims
            SET state = ?, result = ?, completed_at = ?
            WHERE idempotency_key = ? AND attempt = ?
            "#,
        )
        .bind(state)
        .bind(json)
        .bind(now.as_ms())
        .bind(&claim.key)
        .bind(claim.attempt)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Ok(false);
        }

        for (stake_id, status) in settled_stakes {
            sqlx::query(
                "UPDATE stakes SET status = ? WHERE id = ? AND status NOT IN ('completed', 'failed')",
            )
            .bind(status.as_str())
            .bind(stake_id.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    /// Claim state string, for inspection.
    pub async fn distribution_state(&self, escrow_id: &EscrowId) -> Result<Option<String>, sqlx::Error> {
        let row = sqlx::query("SELECT state FROM distribution_claims WHERE escrow_id = ?")
            .bind(escrow_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| r.try_get("state")).transpose()
    }

    // =========================================================================
    // Stakeholder payouts
    // =========================================================================

    pub async fn list_payouts(&self, escrow_id: &EscrowId) -> Result<Vec<StakeholderPayout>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT escrow_id, stake_id, user_id, amount, status, payment_reference,
                   transaction_id, error, updated_at
            FROM stakeholder_payouts
            WHERE escrow_id = ?
            ORDER BY stake_id ASC
            "#,
        )
        .bind(escrow_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(payout_from_row).collect()
    }

    /// The wallet accepted a transfer. Never downgrades a `paid` payout.
    pub async fn mark_payout_sent(
        &self,
        escrow_id: &EscrowId,
        stake_id: &StakeId,
        user_id: &UserId,
        amount: Decimal,
        payment_reference: &str,
        now: TimeMs,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO stakeholder_payouts (
                escrow_id, stake_id, user_id, amount, status, payment_reference, updated_at
            ) VALUES (?, ?, ?, ?, 'sent', ?, ?)
            ON CONFLICT(escrow_id, stake_id) DO UPDATE SET
                status = 'sent',
                amount = excluded.amount,
                payment_reference = excluded.payment_reference,
                error = NULL,
                updated_at = excluded.updated_at
            WHERE stakeholder_payouts.status != 'paid'
            "#,
        )
        .bind(escrow_id.as_str())
        .bind(stake_id.as_str())
        .bind(user_id.as_str())
        .bind(amount.to_canonical_string())
        .bind(payment_reference)
        .bind(now.as_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// The wallet refused a transfer. Only overwrites an earlier failure.
    pub async fn mark_payout_failed(
        &self,
        escrow_id: &EscrowId,
        stake_id: &StakeId,
        user_id: &UserId,
        amount: Decimal,
        error: &str,
        now: TimeMs,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO stakeholder_payouts (
                escrow_id, stake_id, user_id, amount, status, error, updated_at
            ) VALUES (?, ?, ?, ?, 'failed', ?, ?)
            ON CONFLICT(escrow_id, stake_id) DO UPDATE SET
                error = excluded.error,
                amount = excluded.amount,
                updated_at = excluded.updated_at
            WHERE stakeholder_payouts.status = 'failed'
            "#,
        )
        .bind(escrow_id.as_str())
        .bind(stake_id.as_str())
        .bind(user_id.as_str())
        .bind(amount.to_canonical_string())
        .bind(error)
        .bind(now.as_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Commit a payout's ledger transaction and mark the payout `paid` in one
    /// sqlite transaction. Returns false if the ledger transaction id was
    /// already committed (the payout is still marked paid).
    pub async fn commit_payout(
        &self,
        record: &TransactionRecord,
        payout: &StakeholderPayout,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let inserted = insert_transaction_conn(&mut tx, record).await?;

        sqlx::query(
            r#"
            INSERT INTO stakeholder_payouts (
                escrow_id, stake_id, user_id, amount, status, payment_reference,
                transaction_id, updated_at
            ) VALUES (?, ?, ?, ?, 'paid', ?, ?, ?)
            ON CONFLICT(escrow_id, stake_id) DO UPDATE SET
                status = 'paid',
                payment_reference = COALESCE(excluded.payment_reference, stakeholder_payouts.payment_reference),
                transaction_id = excluded.transaction_id,
                error = NULL,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(payout.escrow_id.as_str())
        .bind(payout.stake_id.as_str())
        .bind(payout.user_id.as_str())
        .bind(payout.amount.to_canonical_string())
        .bind(payout.payment_reference.as_deref())
        .bind(&record.transaction_id)
        .bind(payout.updated_at.as_ms())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{dec, make_stake, setup_test_db};
    use super::super::HoldOutcome;
    use super::*;
    use crate::domain::{Account, EscrowStatus, OwnershipClass, TransactionKind};

    async fn held_escrow(repo: &Repository) -> Escrow {
        match repo
            .hold_stake_atomic(
                &make_stake("s1", "g1", "u1", "100"),
                OwnershipClass::Individual,
                TimeMs::new(0),
            )
            .await
            .unwrap()
        {
            HoldOutcome::Held(escrow) => escrow,
            other => panic!("expected Held, got {:?}", other),
        }
    }

    fn released_result(escrow: &Escrow) -> DistributionResult {
        DistributionResult {
            goal_id: escrow.goal_id.clone(),
            escrow_id: escrow.id.clone(),
            status: EscrowStatus::Released,
            transaction_refs: vec!["release:abc".to_string()],
            partial: false,
            errors: Vec::new(),
            message: None,
        }
    }

    #[tokio::test]
    async fn test_outcome_first_write_wins() {
        let (repo, _temp) = setup_test_db().await;
        let goal = GoalId::new("g1");

        let first = repo
            .record_goal_outcome(&goal, &GoalOutcome::Succeeded, TimeMs::new(1))
            .await
            .unwrap();
        let second = repo
            .record_goal_outcome(&goal, &GoalOutcome::Failed, TimeMs::new(2))
            .await
            .unwrap();

        assert_eq!(first, GoalOutcome::Succeeded);
        assert_eq!(second, GoalOutcome::Succeeded);
    }

    #[tokio::test]
    async fn test_dispute_lifecycle() {
        let (repo, _temp) = setup_test_db().await;
        let dispute = Dispute {
            id: DisputeId::new("d1"),
            goal_id: GoalId::new("g1"),
            status: DisputeStatus::Open,
            reason: "proof rejected".to_string(),
            opened_at: TimeMs::new(5),
            resolved_at: None,
        };
        repo.insert_dispute(&dispute).await.unwrap();
        assert!(repo.list_disputes(&GoalId::new("g1")).await.unwrap()[0].is_open());

        let resolved = repo
            .resolve_dispute(&DisputeId::new("d1"), TimeMs::new(9))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.status, DisputeStatus::Resolved);
        assert_eq!(resolved.resolved_at, Some(TimeMs::new(9)));

        let again = repo
            .resolve_dispute(&DisputeId::new("d1"), TimeMs::new(20))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(again.resolved_at, Some(TimeMs::new(9)));
    }

    #[tokio::test]
    async fn test_claim_is_exclusive_until_lease_expires() {
        let (repo, _temp) = setup_test_db().await;
        let escrow = held_escrow(&repo).await;

        let first = repo.claim_distribution(&escrow, 1000, TimeMs::new(10)).await.unwrap();
        let claim = match first {
            ClaimOutcome::Acquired(claim) => claim,
            other => panic!("expected Acquired, got {:?}", other),
        };
        assert_eq!(claim.attempt, 1);
        assert_eq!(claim.pool, dec("100"));

        let busy = repo.claim_distribution(&escrow, 1000, TimeMs::new(500)).await.unwrap();
        assert_eq!(busy, ClaimOutcome::InProgress { claimed_at: TimeMs::new(10) });

        let takeover = repo.claim_distribution(&escrow, 1000, TimeMs::new(1010)).await.unwrap();
        match takeover {
            ClaimOutcome::Acquired(c) => assert_eq!(c.attempt, 2),
            other => panic!("expected takeover, got {:?}", other),
        }

        // The superseded attempt can no longer settle.
        let stale = repo
            .complete_distribution(&claim, &released_result(&escrow), &[], TimeMs::new(1020))
            .await
            .unwrap();
        assert!(!stale);
    }

    #[tokio::test]
    async fn test_completed_claim_returns_stored_result() {
        let (repo, _temp) = setup_test_db().await;
        let escrow = held_escrow(&repo).await;
        let claim = match repo.claim_distribution(&escrow, 1000, TimeMs::new(10)).await.unwrap() {
            ClaimOutcome::Acquired(claim) => claim,
            other => panic!("expected Acquired, got {:?}", other),
        };

        let result = released_result(&escrow);
        assert!(repo
            .complete_distribution(
                &claim,
                &result,
                &[(StakeId::new("s1"), StakeStatus::Completed)],
                TimeMs::new(20)
            )
            .await
            .unwrap());

        let again = repo.claim_distribution(&escrow, 1000, TimeMs::new(30)).await.unwrap();
        assert_eq!(again, ClaimOutcome::Completed(result));
        let stake = repo.get_stake(&StakeId::new("s1")).await.unwrap().unwrap();
        assert_eq!(stake.status, StakeStatus::Completed);
    }

    #[tokio::test]
    async fn test_failed_payout_never_downgrades_paid() {
        let (repo, _temp) = setup_test_db().await;
        let escrow = held_escrow(&repo).await;
        let stake = StakeId::new("s1");
        let user = UserId::new("u1");

        let record = TransactionRecord::new("release:1", TransactionKind::EscrowRelease, TimeMs::new(5))
            .debit(&Account::Escrow(escrow.id.clone()), dec("10"), "release", None)
            .credit(&Account::Wallet(user.clone()), dec("10"), "release", None);
        let payout = StakeholderPayout {
            escrow_id: escrow.id.clone(),
            stake_id: stake.clone(),
            user_id: user.clone(),
            amount: dec("10"),
            status: PayoutStatus::Paid,
            payment_reference: Some("pay_1".to_string()),
            transaction_id: None,
            error: None,
            updated_at: TimeMs::new(5),
        };
        assert!(repo.commit_payout(&record, &payout).await.unwrap());
        assert!(!repo.commit_payout(&record, &payout).await.unwrap());

        repo.mark_payout_failed(&escrow.id, &stake, &user, dec("10"), "boom", TimeMs::new(6))
            .await
            .unwrap();
        repo.mark_payout_sent(&escrow.id, &stake, &user, dec("10"), "pay_2", TimeMs::new(7))
            .await
            .unwrap();

        let payouts = repo.list_payouts(&escrow.id).await.unwrap();
        assert_eq!(payouts.len(), 1);
        assert_eq!(payouts[0].status, PayoutStatus::Paid);
        assert_eq!(payouts[0].payment_reference.as_deref(), Some("pay_1"));
        assert_eq!(payouts[0].transaction_id.as_deref(), Some("release:1"));
    }
}
