//! Double-entry ledger types.
//!
//! Every money movement is a [`TransactionRecord`] whose entries balance
//! (sum of debits == sum of credits). Entries are append-only.
//!
//! # Balance convention
//!
//! Wallet, escrow, charity and platform accounts are credit-normal: a credit
//! increases their balance, a debit decreases it. The external clearing
//! account (money entering or leaving through payment rails) is
//! debit-normal.

use crate::domain::{Decimal, EscrowId, TimeMs, UserId};
use serde::{Deserialize, Serialize};

/// Category of a ledger account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AccountType {
    UserWallet,
    Escrow,
    Charity,
    PlatformRevenue,
    PlatformFees,
    Clearing,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::UserWallet => "userWallet",
            AccountType::Escrow => "escrow",
            AccountType::Charity => "charity",
            AccountType::PlatformRevenue => "platformRevenue",
            AccountType::PlatformFees => "platformFees",
            AccountType::Clearing => "clearing",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "userWallet" => Some(AccountType::UserWallet),
            "escrow" => Some(AccountType::Escrow),
            "charity" => Some(AccountType::Charity),
            "platformRevenue" => Some(AccountType::PlatformRevenue),
            "platformFees" => Some(AccountType::PlatformFees),
            "clearing" => Some(AccountType::Clearing),
            _ => None,
        }
    }

    /// Credit-normal accounts grow with credits.
    pub fn is_credit_normal(&self) -> bool {
        !matches!(self, AccountType::Clearing)
    }
}

/// A concrete ledger account.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Account {
    Wallet(UserId),
    Escrow(EscrowId),
    Charity,
    PlatformRevenue,
    PlatformFees,
    Clearing,
}

impl Account {
    pub fn id(&self) -> String {
        match self {
            Account::Wallet(user) => format!("wallet:{}", user),
            Account::Escrow(escrow) => format!("escrow:{}", escrow),
            Account::Charity => "charity:pool".to_string(),
            Account::PlatformRevenue => "platform:revenue".to_string(),
            Account::PlatformFees => "platform:fees".to_string(),
            Account::Clearing => "external:clearing".to_string(),
        }
    }

    pub fn account_type(&self) -> AccountType {
        match self {
            Account::Wallet(_) => AccountType::UserWallet,
            Account::Escrow(_) => AccountType::Escrow,
            Account::Charity => AccountType::Charity,
            Account::PlatformRevenue => AccountType::PlatformRevenue,
            Account::PlatformFees => AccountType::PlatformFees,
            Account::Clearing => AccountType::Clearing,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Debit,
    Credit,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Debit => "debit",
            EntryType::Credit => "credit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "debit" => Some(EntryType::Debit),
            "credit" => Some(EntryType::Credit),
            _ => None,
        }
    }
}

/// One side of a double-entry posting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub transaction_id: String,
    pub account_id: String,
    pub account_type: AccountType,
    pub entry_type: EntryType,
    pub amount: Decimal,
    pub description: String,
    pub reference: Option<String>,
    pub timestamp: TimeMs,
}

impl LedgerEntry {
    /// Signed effect of this entry on its account's balance.
    pub fn balance_delta(&self) -> Decimal {
        let increases = match self.entry_type {
            EntryType::Credit => self.account_type.is_credit_normal(),
            EntryType::Debit => !self.account_type.is_credit_normal(),
        };
        if increases {
            self.amount
        } else {
            -self.amount
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransactionKind {
    Payment,
    Donation,
    EscrowHold,
    EscrowRelease,
    Fee,
    Forfeiture,
    Refund,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Payment => "payment",
            TransactionKind::Donation => "donation",
            TransactionKind::EscrowHold => "escrowHold",
            TransactionKind::EscrowRelease => "escrowRelease",
            TransactionKind::Fee => "fee",
            TransactionKind::Forfeiture => "forfeiture",
            TransactionKind::Refund => "refund",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "payment" => Some(TransactionKind::Payment),
            "donation" => Some(TransactionKind::Donation),
            "escrowHold" => Some(TransactionKind::EscrowHold),
            "escrowRelease" => Some(TransactionKind::EscrowRelease),
            "fee" => Some(TransactionKind::Fee),
            "forfeiture" => Some(TransactionKind::Forfeiture),
            "refund" => Some(TransactionKind::Refund),
            _ => None,
        }
    }
}

/// A group of entries committed together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub transaction_id: String,
    pub kind: TransactionKind,
    pub entries: Vec<LedgerEntry>,
    pub created_at: TimeMs,
}

impl TransactionRecord {
    /// Start a transaction; entries are added with [`debit`](Self::debit) and
    /// [`credit`](Self::credit).
    pub fn new(transaction_id: impl Into<String>, kind: TransactionKind, at: TimeMs) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            kind,
            entries: Vec::new(),
            created_at: at,
        }
    }

    pub fn debit(
        self,
        account: &Account,
        amount: Decimal,
        description: &str,
        reference: Option<&str>,
    ) -> Self {
        self.post(account, EntryType::Debit, amount, description, reference)
    }

    pub fn credit(
        self,
        account: &Account,
        amount: Decimal,
        description: &str,
        reference: Option<&str>,
    ) -> Self {
        self.post(account, EntryType::Credit, amount, description, reference)
    }

    /// Zero amounts are skipped so fee-free legs don't produce empty postings.
    fn post(
        mut self,
        account: &Account,
        entry_type: EntryType,
        amount: Decimal,
        description: &str,
        reference: Option<&str>,
    ) -> Self {
        if amount.is_zero() {
            return self;
        }
        self.entries.push(LedgerEntry {
            transaction_id: self.transaction_id.clone(),
            account_id: account.id(),
            account_type: account.account_type(),
            entry_type,
            amount,
            description: description.to_string(),
            reference: reference.map(str::to_string),
            timestamp: self.created_at,
        });
        self
    }

    pub fn total_debits(&self) -> Decimal {
        sum_of(&self.entries, EntryType::Debit)
    }

    pub fn total_credits(&self) -> Decimal {
        sum_of(&self.entries, EntryType::Credit)
    }

    pub fn is_balanced(&self) -> bool {
        entries_balance(&self.entries)
    }
}

fn sum_of(entries: &[LedgerEntry], entry_type: EntryType) -> Decimal {
    entries
        .iter()
        .filter(|e| e.entry_type == entry_type)
        .map(|e| e.amount)
        .sum()
}

/// Debit sum equals credit sum, every amount is positive, and the set is non-empty.
pub fn entries_balance(entries: &[LedgerEntry]) -> bool {
    !entries.is_empty()
        && entries.iter().all(|e| e.amount.is_positive())
        && sum_of(entries, EntryType::Debit) == sum_of(entries, EntryType::Credit)
}

/// Derive a stable transaction id from its identifying parts.
///
/// Same parts always give the same id, so a retried settlement collides
/// with the unique constraint instead of writing twice.
pub fn derive_transaction_id(prefix: &str, parts: &[&str]) -> String {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u32).to_le_bytes());
        hasher.update(part.as_bytes());
    }
    let hash = hasher.finalize();
    format!("{}:{}", prefix, hex::encode(&hash[..16]))
}
