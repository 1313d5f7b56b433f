//! Transaction records and their ledger entries.

use crate::domain::{
    AccountType, EntryType, LedgerEntry, TimeMs, TransactionKind, TransactionRecord,
};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;

use super::{get_decimal, get_enum, get_time, Repository};

fn entry_from_row(row: &SqliteRow) -> Result<LedgerEntry, sqlx::Error> {
    Ok(LedgerEntry {
        transaction_id: row.try_get("transaction_id")?,
        account_id: row.try_get("account_id")?,
        account_type: get_enum(row, "account_type", AccountType::parse)?,
        entry_type: get_enum(row, "entry_type", EntryType::parse)?,
        amount: get_decimal(row, "amount")?,
        description: row.try_get("description")?,
        reference: row.try_get("reference")?,
        timestamp: get_time(row, "timestamp")?,
    })
}

/// Write a transaction and its entries on an open connection.
///
/// Returns false without writing anything if the transaction id exists.
pub(super) async fn insert_transaction_conn(
    conn: &mut SqliteConnection,
    record: &TransactionRecord,
) -> Result<bool, sqlx::Error> {
    let inserted = sqlx::query(
        r#"
        INSERT INTO transaction_records (transaction_id, kind, created_at)
        VALUES (?, ?, ?)
        ON CONFLICT(transaction_id) DO NOTHING
        "#,
    )
    .bind(&record.transaction_id)
    .bind(record.kind.as_str())
    .bind(record.created_at.as_ms())
    .execute(&mut *conn)
    .await?;

    if inserted.rows_affected() == 0 {
        return Ok(false);
    }

    for entry in &record.entries {
        sqlx::query(
            r#"
            INSERT INTO ledger_entries (
                transaction_id, account_id, account_type, entry_type, amount,
                description, reference, timestamp
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.transaction_id)
        .bind(&entry.account_id)
        .bind(entry.account_type.as_str())
        .bind(entry.entry_type.as_str())
        .bind(entry.amount.to_canonical_string())
        .bind(&entry.description)
        .bind(entry.reference.as_deref())
        .bind(entry.timestamp.as_ms())
        .execute(&mut *conn)
        .await?;
    }

    Ok(true)
}

impl Repository {
    /// Atomically persist a transaction record with all of its entries.
    ///
    /// Returns false if a transaction with the same id was already committed.
    pub async fn insert_transaction(&self, record: &TransactionRecord) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let inserted = insert_transaction_conn(&mut tx, record).await?;
        if inserted {
            tx.commit().await?;
        }
        Ok(inserted)
    }

    /// Load a committed transaction with its entries in insertion order.
    pub async fn get_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<Option<TransactionRecord>, sqlx::Error> {
        let header = sqlx::query(
            "SELECT transaction_id, kind, created_at FROM transaction_records WHERE transaction_id = ?",
        )
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(header) = header else {
            return Ok(None);
        };

        let rows = sqlx::query(
            r#"
            SELECT transaction_id, account_id, account_type, entry_type, amount,
                   description, reference, timestamp
            FROM ledger_entries
            WHERE transaction_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(transaction_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(TransactionRecord {
            transaction_id: header.try_get("transaction_id")?,
            kind: get_enum(&header, "kind", TransactionKind::parse)?,
            entries: rows.iter().map(entry_from_row).collect::<Result<_, _>>()?,
            created_at: get_time(&header, "created_at")?,
        }))
    }

    /// Every entry posted to an account at or before `as_of`.
    pub async fn list_account_entries(
        &self,
        account_id: &str,
        as_of: TimeMs,
    ) -> Result<Vec<LedgerEntry>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT transaction_id, account_id, account_type, entry_type, amount,
                   description, reference, timestamp
            FROM ledger_entries
            WHERE account_id = ? AND timestamp <= ?
            ORDER BY timestamp ASC, id ASC
            "#,
        )
        .bind(account_id)
        .bind(as_of.as_ms())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(entry_from_row).collect()
    }

    /// Count committed transactions. Used to assert that rejected operations
    /// wrote nothing.
    pub async fn count_transactions(&self) -> Result<i64, sqlx::Error> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM transaction_records")
            .fetch_one(&self.pool)
            .await?;
        row.try_get("n")
    }
}
