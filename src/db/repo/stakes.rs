//! Stake persistence and bulk accrual writes.

use crate::domain::{Decimal, GoalId, Stake, StakeId, StakeStatus, TimeMs, UserId};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;
use tracing::warn;

use super::{decode_error, get_decimal, get_enum, get_time, Repository};

/// A stake row that could not be turned into a `Stake`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StakeDecodeFailure {
    pub stake_id: StakeId,
    pub message: String,
}

/// New accrual state for one stake, written by the refresh job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccrualUpdate {
    pub stake_id: StakeId,
    pub goal_id: GoalId,
    pub accrued_amount: Decimal,
    pub status: StakeStatus,
}

const STAKE_COLUMNS: &str = r#"
    id, goal_id, user_id, principal, apr_model, accrual_method,
    fee_rate_on_stake, fee_rate_on_withdrawal, accrued_amount, status,
    start_at, last_accrual_at, deadline
"#;

fn stake_from_row(row: &SqliteRow) -> Result<Stake, sqlx::Error> {
    let apr_model_json: String = row.try_get("apr_model")?;
    let accrual_method_json: String = row.try_get("accrual_method")?;

    Ok(Stake {
        id: StakeId::new(row.try_get::<String, _>("id")?),
        goal_id: GoalId::new(row.try_get::<String, _>("goal_id")?),
        user_id: UserId::new(row.try_get::<String, _>("user_id")?),
        principal: get_decimal(row, "principal")?,
        apr_model: serde_json::from_str(&apr_model_json)
            .map_err(|e| decode_error(format!("invalid apr_model: {}", e)))?,
        accrual_method: serde_json::from_str(&accrual_method_json)
            .map_err(|e| decode_error(format!("invalid accrual_method: {}", e)))?,
        fee_rate_on_stake: get_decimal(row, "fee_rate_on_stake")?,
        fee_rate_on_withdrawal: get_decimal(row, "fee_rate_on_withdrawal")?,
        accrued_amount: get_decimal(row, "accrued_amount")?,
        status: get_enum(row, "status", StakeStatus::parse)?,
        start_at: get_time(row, "start_at")?,
        last_accrual_at: get_time(row, "last_accrual_at")?,
        deadline: get_time(row, "deadline")?,
    })
}

/// Insert a stake on an open connection (part of a larger transaction).
pub(super) async fn insert_stake_conn(
    conn: &mut SqliteConnection,
    stake: &Stake,
) -> Result<bool, sqlx::Error> {
    let apr_model = serde_json::to_string(&stake.apr_model)
        .map_err(|e| decode_error(format!("cannot encode apr_model: {}", e)))?;
    let accrual_method = serde_json::to_string(&stake.accrual_method)
        .map_err(|e| decode_error(format!("cannot encode accrual_method: {}", e)))?;

    let result = sqlx::query(
        r#"
        INSERT INTO stakes (
            id, goal_id, user_id, principal, apr_model, accrual_method,
            fee_rate_on_stake, fee_rate_on_withdrawal, accrued_amount, status,
            start_at, last_accrual_at, deadline
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO NOTHING
        "#,
    )
    .bind(stake.id.as_str())
    .bind(stake.goal_id.as_str())
    .bind(stake.user_id.as_str())
    .bind(stake.principal.to_canonical_string())
    .bind(apr_model)
    .bind(accrual_method)
    .bind(stake.fee_rate_on_stake.to_canonical_string())
    .bind(stake.fee_rate_on_withdrawal.to_canonical_string())
    .bind(stake.accrued_amount.to_canonical_string())
    .bind(stake.status.as_str())
    .bind(stake.start_at.as_ms())
    .bind(stake.last_accrual_at.as_ms())
    .bind(stake.deadline.as_ms())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Sum the accrued amounts of every stake of a goal, in Rust.
async fn goal_accrued_total(
    conn: &mut SqliteConnection,
    goal_id: &GoalId,
) -> Result<Decimal, sqlx::Error> {
    let rows = sqlx::query("SELECT accrued_amount FROM stakes WHERE goal_id = ? ORDER BY id")
        .bind(goal_id.as_str())
        .fetch_all(&mut *conn)
        .await?;

    let mut total = Decimal::zero();
    for row in &rows {
        total += get_decimal(row, "accrued_amount")?;
    }
    Ok(total)
}

impl Repository {
    /// Fetch one stake by id.
    pub async fn get_stake(&self, id: &StakeId) -> Result<Option<Stake>, sqlx::Error> {
        let row = sqlx::query(&format!("SELECT {} FROM stakes WHERE id = ?", STAKE_COLUMNS))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(stake_from_row).transpose()
    }

    /// All stakes of a goal, ordered by start time then id.
    pub async fn list_stakes_for_goal(&self, goal_id: &GoalId) -> Result<Vec<Stake>, sqlx::Error> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM stakes WHERE goal_id = ? ORDER BY start_at ASC, id ASC",
            STAKE_COLUMNS
        ))
        .bind(goal_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(stake_from_row).collect()
    }

    /// Accrual-eligible stakes, for every user or a single one. Stakes in an
    /// escrow a distribution has claimed are frozen and left out.
    ///
    /// Rows that fail to decode are reported separately instead of failing
    /// the whole query.
    pub async fn list_accruing_stakes(
        &self,
        user_id: Option<&UserId>,
    ) -> Result<(Vec<Stake>, Vec<StakeDecodeFailure>), sqlx::Error> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM stakes
            WHERE status IN ('active', 'pendingLiquidation')
              AND (? IS NULL OR user_id = ?)
              AND NOT EXISTS (
                  SELECT 1
                  FROM escrows e
                  JOIN distribution_claims c ON c.escrow_id = e.id
                  WHERE e.goal_id = stakes.goal_id
              )
            ORDER BY id ASC
            "#,
            STAKE_COLUMNS
        ))
        .bind(user_id.map(|u| u.as_str()))
        .bind(user_id.map(|u| u.as_str()))
        .fetch_all(&self.pool)
        .await?;

        let mut stakes = Vec::with_capacity(rows.len());
        let mut failures = Vec::new();
        for row in &rows {
            match stake_from_row(row) {
                Ok(stake) => stakes.push(stake),
                Err(e) => {
                    let stake_id = StakeId::new(row.try_get::<String, _>("id").unwrap_or_default());
                    warn!(stake_id = %stake_id, error = %e, "Failed to decode stake row");
                    failures.push(StakeDecodeFailure {
                        stake_id,
                        message: e.to_string(),
                    });
                }
            }
        }

        Ok((stakes, failures))
    }

    /// Compare-and-set a stake's status. Returns false if the stake was not
    /// in one of `from`.
    pub async fn transition_stake_status(
        &self,
        id: &StakeId,
        from: &[StakeStatus],
        to: StakeStatus,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let current = sqlx::query("SELECT status FROM stakes WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = current else {
            return Ok(false);
        };
        let status = get_enum(&row, "status", StakeStatus::parse)?;
        if !from.contains(&status) {
            return Ok(false);
        }

        let result = sqlx::query("UPDATE stakes SET status = ? WHERE id = ? AND status = ?")
            .bind(to.as_str())
            .bind(id.as_str())
            .bind(status.as_str())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    /// Write a batch of accrual updates in one transaction.
    ///
    /// Only stakes still accrual-eligible and outside a claimed escrow are
    /// touched, so a stake settled concurrently keeps its frozen amount. Each affected goal's escrow gets
    /// the new accrued total unless a distribution has already claimed it.
    ///
    /// Returns the number of stakes updated.
    pub async fn apply_accrual_updates(
        &self,
        updates: &[AccrualUpdate],
        now: TimeMs,
    ) -> Result<usize, sqlx::Error> {
        if updates.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut updated = 0usize;
        let mut goals: Vec<&GoalId> = Vec::new();

        for update in updates {
            let result = sqlx::query(
                r#"
                UPDATE stakes
                SET accrued_amount = ?, status = ?, last_accrual_at = ?
                WHERE id = ?
                  AND status IN ('active', 'pendingLiquidation')
                  AND NOT EXISTS (
                      SELECT 1
                      FROM escrows e
                      JOIN distribution_claims c ON c.escrow_id = e.id
                      WHERE e.goal_id = stakes.goal_id
                  )
                "#,
            )
            .bind(update.accrued_amount.to_canonical_string())
            .bind(update.status.as_str())
            .bind(now.as_ms())
            .bind(update.stake_id.as_str())
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() > 0 {
                updated += 1;
                if !goals.contains(&&update.goal_id) {
                    goals.push(&update.goal_id);
                }
            }
        }

        for goal_id in goals {
            let accrued = goal_accrued_total(&mut tx, goal_id).await?;
            sqlx::query(
                r#"
                UPDATE escrows
                SET accrued_amount = ?, updated_at = ?
                WHERE goal_id = ?
                  AND status IN ('held', 'pendingDistribution')
                  AND NOT EXISTS (
                      SELECT 1 FROM distribution_claims c WHERE c.escrow_id = escrows.id
                  )
                "#,
            )
            .bind(accrued.to_canonical_string())
            .bind(now.as_ms())
            .bind(goal_id.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(updated)
    }
}
