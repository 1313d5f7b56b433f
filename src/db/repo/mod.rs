//! Repository layer for database operations.
//!
//! This module provides the `Repository` struct for all database operations.
//! Methods are organized across submodules by domain:
//! - `stakes.rs` - Stake persistence and bulk accrual writes
//! - `escrows.rs` - Escrow records, stakeholders and payout instructions
//! - `ledger.rs` - Transaction records and ledger entries
//! - `distributions.rs` - Disputes, outcomes, distribution claims and payouts

mod distributions;
mod escrows;
mod ledger;
mod stakes;

pub use distributions::{ClaimOutcome, DistributionClaim};
pub use escrows::{EscrowInstruction, HoldOutcome};
pub use stakes::{AccrualUpdate, StakeDecodeFailure};

use crate::domain::{Decimal, TimeMs};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::str::FromStr;

/// Repository for database operations.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    /// Cheap liveness probe used by `/ready`.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

pub(crate) fn decode_error(msg: impl Into<String>) -> sqlx::Error {
    sqlx::Error::Decode(msg.into().into())
}

/// Read a money column stored as a canonical decimal string.
///
/// Corrupt values surface as decode errors rather than silently becoming 0.
pub(crate) fn get_decimal(row: &SqliteRow, column: &str) -> Result<Decimal, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    Decimal::from_str(&raw)
        .map_err(|e| decode_error(format!("column {} holds invalid decimal {:?}: {}", column, raw, e)))
}

pub(crate) fn get_time(row: &SqliteRow, column: &str) -> Result<TimeMs, sqlx::Error> {
    Ok(TimeMs::new(row.try_get::<i64, _>(column)?))
}

/// Parse an enum column through its `parse` function.
pub(crate) fn get_enum<T>(
    row: &SqliteRow,
    column: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<T, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    parse(&raw).ok_or_else(|| decode_error(format!("column {} holds unknown value {:?}", column, raw)))
}
