//! Escrow records, stakeholders and payout instructions.

use crate::domain::{
    Decimal, Escrow, EscrowId, EscrowStatus, GoalId, InstructionKind, OwnershipClass, Stake,
    StakeId, Stakeholder, TimeMs, UserId,
};
use serde::Serialize;
use sqlx::sqlite::SqliteConnection;
use sqlx::Row;

use super::stakes::insert_stake_conn;
use super::{get_decimal, get_enum, get_time, Repository};

/// Result of persisting a newly held stake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HoldOutcome {
    /// Stake stored; the goal's escrow now includes it.
    Held(Escrow),
    /// A stake with this id already exists. Nothing was written.
    DuplicateStake,
    /// The goal's escrow is no longer accepting stakes. Nothing was written.
    EscrowNotHeld(EscrowId, EscrowStatus),
}

/// A recorded release, forfeit or refund against an escrow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EscrowInstruction {
    pub id: i64,
    pub escrow_id: EscrowId,
    pub kind: InstructionKind,
    pub amount: Decimal,
    pub beneficiary: String,
    pub created_at: TimeMs,
}

async fn load_escrow(
    conn: &mut SqliteConnection,
    column: &str,
    value: &str,
) -> Result<Option<Escrow>, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"
        SELECT id, goal_id, ownership, total_principal, accrued_amount, status,
               created_at, updated_at
        FROM escrows WHERE {} = ?
        "#,
        column
    ))
    .bind(value)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let id = EscrowId::new(row.try_get::<String, _>("id")?);
    let stakeholder_rows = sqlx::query(
        r#"
        SELECT stake_id, user_id, principal, fee_rate_on_stake, fee_rate_on_withdrawal
        FROM escrow_stakeholders
        WHERE escrow_id = ?
        ORDER BY position ASC
        "#,
    )
    .bind(id.as_str())
    .fetch_all(&mut *conn)
    .await?;

    let mut stakeholders = Vec::with_capacity(stakeholder_rows.len());
    for r in &stakeholder_rows {
        stakeholders.push(Stakeholder {
            stake_id: StakeId::new(r.try_get::<String, _>("stake_id")?),
            user_id: UserId::new(r.try_get::<String, _>("user_id")?),
            principal: get_decimal(r, "principal")?,
            fee_rate_on_stake: get_decimal(r, "fee_rate_on_stake")?,
            fee_rate_on_withdrawal: get_decimal(r, "fee_rate_on_withdrawal")?,
        });
    }

    Ok(Some(Escrow {
        id,
        goal_id: GoalId::new(row.try_get::<String, _>("goal_id")?),
        ownership: get_enum(&row, "ownership", OwnershipClass::parse)?,
        total_principal: get_decimal(&row, "total_principal")?,
        accrued_amount: get_decimal(&row, "accrued_amount")?,
        stakeholders,
        status: get_enum(&row, "status", EscrowStatus::parse)?,
        created_at: get_time(&row, "created_at")?,
        updated_at: get_time(&row, "updated_at")?,
    }))
}

impl Repository {
    /// Persist a stake and add it to its goal's escrow, creating the escrow
    /// on first stake. Both writes land in one transaction.
    pub async fn hold_stake_atomic(
        &self,
        stake: &Stake,
        ownership: OwnershipClass,
        now: TimeMs,
    ) -> Result<HoldOutcome, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        if !insert_stake_conn(&mut tx, stake).await? {
            return Ok(HoldOutcome::DuplicateStake);
        }

        let escrow_id = match load_escrow(&mut tx, "goal_id", stake.goal_id.as_str()).await? {
            Some(existing) => {
                if existing.status != EscrowStatus::Held {
                    return Ok(HoldOutcome::EscrowNotHeld(existing.id, existing.status));
                }
                // Stakeholders are fixed once a distribution has claimed the escrow.
                let claimed = sqlx::query("SELECT 1 FROM distribution_claims WHERE escrow_id = ?")
                    .bind(existing.id.as_str())
                    .fetch_optional(&mut *tx)
                    .await?;
                if claimed.is_some() {
                    return Ok(HoldOutcome::EscrowNotHeld(
                        existing.id,
                        EscrowStatus::PendingDistribution,
                    ));
                }
                sqlx::query(
                    r#"
                    UPDATE escrows
                    SET total_principal = ?, accrued_amount = ?, updated_at = ?
                    WHERE id = ?
                    "#,
                )
                .bind((existing.total_principal + stake.principal).to_canonical_string())
                .bind((existing.accrued_amount + stake.accrued_amount).to_canonical_string())
                .bind(now.as_ms())
                .bind(existing.id.as_str())
                .execute(&mut *tx)
                .await?;
                existing.id
            }
            None => {
                let id = EscrowId::generate();
                sqlx::query(
                    r#"
                    INSERT INTO escrows (
                        id, goal_id, ownership, total_principal, accrued_amount, status,
                        created_at, updated_at
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(id.as_str())
                .bind(stake.goal_id.as_str())
                .bind(ownership.as_str())
                .bind(stake.principal.to_canonical_string())
                .bind(stake.accrued_amount.to_canonical_string())
                .bind(EscrowStatus::Held.as_str())
                .bind(now.as_ms())
                .bind(now.as_ms())
                .execute(&mut *tx)
                .await?;
                id
            }
        };

        sqlx::query(
            r#"
            INSERT INTO escrow_stakeholders (
                escrow_id, stake_id, user_id, principal, fee_rate_on_stake,
                fee_rate_on_withdrawal, position
            )
            SELECT ?, ?, ?, ?, ?, ?, COUNT(*) FROM escrow_stakeholders WHERE escrow_id = ?
            "#,
        )
        .bind(escrow_id.as_str())
        .bind(stake.id.as_str())
        .bind(stake.user_id.as_str())
        .bind(stake.principal.to_canonical_string())
        .bind(stake.fee_rate_on_stake.to_canonical_string())
        .bind(stake.fee_rate_on_withdrawal.to_canonical_string())
        .bind(escrow_id.as_str())
        .execute(&mut *tx)
        .await?;

        let escrow = load_escrow(&mut tx, "id", escrow_id.as_str())
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;
        tx.commit().await?;

        Ok(HoldOutcome::Held(escrow))
    }

    pub async fn get_escrow(&self, id: &EscrowId) -> Result<Option<Escrow>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        load_escrow(&mut conn, "id", id.as_str()).await
    }

    /// The escrow holding a goal's stakes, if any stake was held.
    pub async fn find_escrow_for_goal(&self, goal_id: &GoalId) -> Result<Option<Escrow>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        load_escrow(&mut conn, "goal_id", goal_id.as_str()).await
    }

    /// Compare-and-set the escrow status. Returns false if the escrow was not
    /// in `expected` (or does not exist).
    pub async fn update_escrow_status(
        &self,
        id: &EscrowId,
        expected: EscrowStatus,
        next: EscrowStatus,
        now: TimeMs,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE escrows SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(next.as_str())
        .bind(now.as_ms())
        .bind(id.as_str())
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Record a payout instruction and move the escrow to the status it
    /// implies, atomically. Returns the new status, or `None` if the escrow
    /// does not exist.
    pub async fn record_instruction(
        &self,
        escrow_id: &EscrowId,
        kind: InstructionKind,
        amount: Decimal,
        beneficiary: &str,
        now: TimeMs,
    ) -> Result<Option<EscrowStatus>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT status FROM escrows WHERE id = ?")
            .bind(escrow_id.as_str())
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let current = get_enum(&row, "status", EscrowStatus::parse)?;
        let next = current.after_instruction(kind);

        sqlx::query(
            r#"
            INSERT INTO escrow_instructions (escrow_id, kind, amount, beneficiary, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(escrow_id.as_str())
        .bind(kind.as_str())
        .bind(amount.to_canonical_string())
        .bind(beneficiary)
        .bind(now.as_ms())
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE escrows SET status = ?, updated_at = ? WHERE id = ?")
            .bind(next.as_str())
            .bind(now.as_ms())
            .bind(escrow_id.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(next))
    }

    pub async fn list_instructions(
        &self,
        escrow_id: &EscrowId,
    ) -> Result<Vec<EscrowInstruction>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, escrow_id, kind, amount, beneficiary, created_at
            FROM escrow_instructions
            WHERE escrow_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(escrow_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(EscrowInstruction {
                    id: row.try_get("id")?,
                    escrow_id: EscrowId::new(row.try_get::<String, _>("escrow_id")?),
                    kind: get_enum(row, "kind", InstructionKind::parse)?,
                    amount: get_decimal(row, "amount")?,
                    beneficiary: row.try_get("beneficiary")?,
                    created_at: get_time(row, "created_at")?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{dec, make_stake, setup_test_db};
    use super::*;

    fn expect_held(outcome: HoldOutcome) -> Escrow {
        match outcome {
            HoldOutcome::Held(escrow) => escrow,
            other => panic!("expected Held, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_first_stake_creates_escrow_and_later_stakes_extend_it() {
        let (repo, _temp) = setup_test_db().await;

        let first = expect_held(
            repo.hold_stake_atomic(
                &make_stake("s1", "g1", "u1", "100"),
                OwnershipClass::Group,
                TimeMs::new(0),
            )
            .await
            .unwrap(),
        );
        assert_eq!(first.total_principal, dec("100"));
        assert_eq!(first.status, EscrowStatus::Held);

        let second = expect_held(
            repo.hold_stake_atomic(
                &make_stake("s2", "g1", "u2", "50.25"),
                OwnershipClass::Group,
                TimeMs::new(10),
            )
            .await
            .unwrap(),
        );
        assert_eq!(second.id, first.id);
        assert_eq!(second.total_principal, dec("150.25"));
        assert_eq!(second.stakeholders.len(), 2);
        assert_eq!(second.stakeholders[0].stake_id, StakeId::new("s1"));
        assert_eq!(second.stakeholders[1].stake_id, StakeId::new("s2"));
        assert!(second.principal_is_consistent());
    }

    #[tokio::test]
    async fn test_duplicate_stake_writes_nothing() {
        let (repo, _temp) = setup_test_db().await;
        let stake = make_stake("s1", "g1", "u1", "100");
        repo.hold_stake_atomic(&stake, OwnershipClass::Individual, TimeMs::new(0))
            .await
            .unwrap();

        let again = repo
            .hold_stake_atomic(&stake, OwnershipClass::Individual, TimeMs::new(0))
            .await
            .unwrap();
        assert_eq!(again, HoldOutcome::DuplicateStake);

        let escrow = repo
            .find_escrow_for_goal(&GoalId::new("g1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(escrow.total_principal, dec("100"));
    }

    #[tokio::test]
    async fn test_settled_escrow_rejects_new_stakes() {
        let (repo, _temp) = setup_test_db().await;
        let escrow = expect_held(
            repo.hold_stake_atomic(
                &make_stake("s1", "g1", "u1", "100"),
                OwnershipClass::Individual,
                TimeMs::new(0),
            )
            .await
            .unwrap(),
        );
        assert!(repo
            .update_escrow_status(&escrow.id, EscrowStatus::Held, EscrowStatus::Released, TimeMs::new(1))
            .await
            .unwrap());

        let outcome = repo
            .hold_stake_atomic(
                &make_stake("s2", "g1", "u2", "10"),
                OwnershipClass::Individual,
                TimeMs::new(2),
            )
            .await
            .unwrap();
        assert_eq!(outcome, HoldOutcome::EscrowNotHeld(escrow.id.clone(), EscrowStatus::Released));
        assert!(repo.get_stake(&StakeId::new("s2")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_status_cas_rejects_stale_expectation() {
        let (repo, _temp) = setup_test_db().await;
        let escrow = expect_held(
            repo.hold_stake_atomic(
                &make_stake("s1", "g1", "u1", "100"),
                OwnershipClass::Individual,
                TimeMs::new(0),
            )
            .await
            .unwrap(),
        );

        let moved = repo
            .update_escrow_status(&escrow.id, EscrowStatus::Partial, EscrowStatus::Released, TimeMs::new(1))
            .await
            .unwrap();
        assert!(!moved);
    }

    #[tokio::test]
    async fn test_record_instruction_updates_status() {
        let (repo, _temp) = setup_test_db().await;
        let escrow = expect_held(
            repo.hold_stake_atomic(
                &make_stake("s1", "g1", "u1", "100"),
                OwnershipClass::Individual,
                TimeMs::new(0),
            )
            .await
            .unwrap(),
        );

        let next = repo
            .record_instruction(&escrow.id, InstructionKind::Forfeit, dec("100"), "charity:pool", TimeMs::new(5))
            .await
            .unwrap();
        assert_eq!(next, Some(EscrowStatus::Forfeited));

        let instructions = repo.list_instructions(&escrow.id).await.unwrap();
        assert_eq!(instructions.len(), 1);
        assert_eq!(instructions[0].kind, InstructionKind::Forfeit);
        assert_eq!(instructions[0].amount, dec("100"));

        let missing = repo
            .record_instruction(&EscrowId::new("nope"), InstructionKind::Release, dec("1"), "x", TimeMs::new(5))
            .await
            .unwrap();
        assert_eq!(missing, None);
    }
}
