//! Append-only double-entry ledger.
//!
//! Entries are staged per transaction id and only become durable through
//! [`LedgerRecorder::commit`], which rejects unbalanced transactions before
//! anything is written. Balance convention: every account is credit-normal
//! (credits increase the balance) except the external clearing account.

use crate::db::Repository;
use crate::domain::{
    Decimal, LedgerEntry, StakeholderPayout, TimeMs, TransactionKind, TransactionRecord,
};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Transaction {transaction_id} is unbalanced: debits {debits}, credits {credits}")]
    UnbalancedTransaction {
        transaction_id: String,
        debits: Decimal,
        credits: Decimal,
    },
    #[error("Transaction {transaction_id} has a non-positive entry amount {amount}")]
    NonPositiveAmount {
        transaction_id: String,
        amount: Decimal,
    },
    #[error("Entry for transaction {found} staged under {expected}")]
    MismatchedTransactionId { expected: String, found: String },
    #[error("Transaction {0} was already committed")]
    AlreadyCommitted(String),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

pub struct LedgerRecorder {
    repo: Arc<Repository>,
    staged: Mutex<HashMap<String, Vec<LedgerEntry>>>,
}

impl LedgerRecorder {
    pub fn new(repo: Arc<Repository>) -> Self {
        Self {
            repo,
            staged: Mutex::new(HashMap::new()),
        }
    }

    /// Stage one entry. Nothing is stored until the transaction commits or
    /// is discarded; staged entries otherwise live as long as the recorder.
    pub async fn append_entry(&self, entry: LedgerEntry) {
        let mut staged = self.staged.lock().await;
        staged
            .entry(entry.transaction_id.clone())
            .or_default()
            .push(entry);
    }

    /// Drop everything staged for `transaction_id` without storing it.
    /// Returns the number of entries dropped.
    pub async fn discard(&self, transaction_id: &str) -> usize {
        let dropped = self
            .staged
            .lock()
            .await
            .remove(transaction_id)
            .map(|entries| entries.len())
            .unwrap_or(0);
        if dropped > 0 {
            debug!(transaction_id, dropped, "Discarded staged ledger entries");
        }
        dropped
    }

    /// Validate and durably store every entry staged for `transaction_id`.
    ///
    /// Staged entries are consumed whether or not the commit succeeds.
    pub async fn commit(
        &self,
        transaction_id: &str,
        kind: TransactionKind,
        at: TimeMs,
    ) -> Result<TransactionRecord, LedgerError> {
        let entries = self
            .staged
            .lock()
            .await
            .remove(transaction_id)
            .unwrap_or_default();

        let record = TransactionRecord {
            transaction_id: transaction_id.to_string(),
            kind,
            entries,
            created_at: at,
        };
        validate(&record)?;

        if !self.repo.insert_transaction(&record).await? {
            return Err(LedgerError::AlreadyCommitted(record.transaction_id));
        }
        debug!(
            transaction_id = %record.transaction_id,
            kind = record.kind.as_str(),
            entries = record.entries.len(),
            "Ledger transaction committed"
        );
        Ok(record)
    }

    /// Stage all of `record`'s entries and commit them as one transaction.
    pub async fn record(&self, record: TransactionRecord) -> Result<TransactionRecord, LedgerError> {
        check_entry_ids(&record)?;
        self.staged
            .lock()
            .await
            .entry(record.transaction_id.clone())
            .or_default()
            .extend(record.entries);
        self.commit(&record.transaction_id, record.kind, record.created_at)
            .await
    }

    /// Commit a stakeholder payout's transaction and mark the payout paid,
    /// atomically. A replay of an already committed transaction is accepted.
    pub async fn record_payout(
        &self,
        record: &TransactionRecord,
        payout: &StakeholderPayout,
    ) -> Result<(), LedgerError> {
        validate(record)?;
        if !self.repo.commit_payout(record, payout).await? {
            debug!(
                transaction_id = %record.transaction_id,
                "Payout transaction already committed; marked paid"
            );
        }
        Ok(())
    }

    /// Debit sum equals credit sum for a stored transaction. Unknown ids are
    /// not balanced.
    pub async fn is_balanced(&self, transaction_id: &str) -> Result<bool, LedgerError> {
        Ok(self
            .repo
            .get_transaction(transaction_id)
            .await?
            .map(|record| record.is_balanced())
            .unwrap_or(false))
    }

    /// Fold of every entry for `account_id` with timestamp <= `as_of`.
    pub async fn balance_as_of(&self, account_id: &str, as_of: TimeMs) -> Result<Decimal, LedgerError> {
        let entries = self.repo.list_account_entries(account_id, as_of).await?;
        Ok(entries.iter().map(|e| e.balance_delta()).sum())
    }
}

fn check_entry_ids(record: &TransactionRecord) -> Result<(), LedgerError> {
    match record
        .entries
        .iter()
        .find(|e| e.transaction_id != record.transaction_id)
    {
        Some(bad) => Err(LedgerError::MismatchedTransactionId {
            expected: record.transaction_id.clone(),
            found: bad.transaction_id.clone(),
        }),
        None => Ok(()),
    }
}

fn validate(record: &TransactionRecord) -> Result<(), LedgerError> {
    check_entry_ids(record)?;
    if let Some(bad) = record.entries.iter().find(|e| !e.amount.is_positive()) {
        return Err(LedgerError::NonPositiveAmount {
            transaction_id: record.transaction_id.clone(),
            amount: bad.amount,
        });
    }
    if !record.is_balanced() {
        warn!(
            transaction_id = %record.transaction_id,
            debits = %record.total_debits(),
            credits = %record.total_credits(),
            "Rejected unbalanced transaction"
        );
        return Err(LedgerError::UnbalancedTransaction {
            transaction_id: record.transaction_id.clone(),
            debits: record.total_debits(),
            credits: record.total_credits(),
        });
    }
    Ok(())
}
