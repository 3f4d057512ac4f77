//! # Database Models
//!
//! This module defines the data structures that map to database tables.
//! Each struct represents a row in a table.
//!
//! ## Table Overview
//!
//! | Table | Description |
//! |-------|-------------|
//! | `accounts` | User coin balances and lifetime counters |
//! | `projects` | Funding records (goal, running total, status) |
//! | `transactions` | Append-style log of every value movement |
//! | `reconciliation_logs` | Audit trail from the ledger auditor |
//!
//! ## Note on Types
//!
//! Coin amounts use `i64` because PostgreSQL has no unsigned integers.
//! The schema and the conditional-update queries keep balances
//! non-negative.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Transaction types for ledger operations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TransactionType {
    /// External money converted to coins via the payment processor
    Purchase,
    /// Coins sent to a project (credited to the project creator)
    Send,
    /// Coins withdrawn to the account's payout destination
    Cashout,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Purchase => "purchase",
            TransactionType::Send => "send",
            TransactionType::Cashout => "cashout",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "purchase" => Some(TransactionType::Purchase),
            "send" => Some(TransactionType::Send),
            "cashout" => Some(TransactionType::Cashout),
            _ => None,
        }
    }
}

/// Transaction status lifecycle.
///
/// A transaction is created `Pending` (purchase, cashout) or directly
/// `Completed` (send). It transitions to exactly one terminal state;
/// terminal states are final.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TransactionStatus::Pending),
            "completed" => Some(TransactionStatus::Completed),
            "failed" => Some(TransactionStatus::Failed),
            "cancelled" => Some(TransactionStatus::Cancelled),
            _ => None,
        }
    }

    /// Whether this status permits no further transitions.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

/// Project lifecycle status. Only `active` projects may receive funds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ProjectStatus {
    Draft,
    Active,
    Completed,
    Pending,
    Rejected,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Draft => "draft",
            ProjectStatus::Active => "active",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Pending => "pending",
            ProjectStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(ProjectStatus::Draft),
            "active" => Some(ProjectStatus::Active),
            "completed" => Some(ProjectStatus::Completed),
            "pending" => Some(ProjectStatus::Pending),
            "rejected" => Some(ProjectStatus::Rejected),
            _ => None,
        }
    }
}

/// Represents an account row.
///
/// The balance fields are mutated only through the conditional-update
/// queries in [`crate::db::queries`]; every balance change is paired with
/// the matching lifetime counter update in the same unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountRecord {
    /// Unique account ID (UUID v4).
    pub id: Uuid,

    /// Display name, unique.
    pub username: String,

    /// Contact email, unique. Forwarded to the payment processor on
    /// checkout so the receipt reaches the buyer.
    pub email: String,

    /// Account role: "user", "employee", "manager" or "admin".
    /// Cashout resolution requires "admin" or "manager".
    pub role: String,

    /// Live coin balance. Never negative.
    pub balance: i64,

    /// Lifetime credits from being paid (sends received).
    /// Only increases.
    pub total_earned: i64,

    /// Lifetime debits (sends + cashouts). Decreases only when a
    /// rejected cashout is refunded.
    pub total_spent: i64,

    /// Payout destination: account holder name.
    pub payout_account_name: Option<String>,

    /// Payout destination: IBAN. A cashout request requires this.
    pub payout_iban: Option<String>,

    /// Payout destination: bank name.
    pub payout_bank_name: Option<String>,

    /// Suspended accounts keep their balance but are blocked upstream.
    pub suspended: bool,

    /// When the account was created.
    pub created_at: DateTime<Utc>,

    /// When any field was last updated.
    pub updated_at: DateTime<Utc>,
}

impl AccountRecord {
    /// Whether a payout destination has been saved.
    pub fn has_payout_destination(&self) -> bool {
        self.payout_iban.as_deref().map(|s| !s.is_empty()).unwrap_or(false)
    }
}

/// Represents a project funding record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectRecord {
    /// Unique project ID (UUID v4).
    pub id: Uuid,

    /// Human-facing serial number (e.g. "YS-ABC123XY"), unique.
    pub serial_number: String,

    /// Project title, used in transaction descriptions.
    pub title: String,

    /// Project category.
    pub category: String,

    /// Funding goal, fixed at creation.
    pub goal_amount: i64,

    /// Cumulative funding received. Monotonically non-decreasing.
    pub current_amount: i64,

    /// Funding deadline.
    pub deadline: DateTime<Utc>,

    /// Owning creator account, fixed at creation.
    pub creator: Uuid,

    /// Lifecycle status. Only "active" projects may receive funds.
    pub status: String,

    /// When the project was created.
    pub created_at: DateTime<Utc>,
}

/// Represents a transaction row.
///
/// Immutable once created except for the single `pending -> terminal`
/// status transition (plus the payment id attached by that transition).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Unique transaction ID (UUID v4).
    pub id: Uuid,

    /// "purchase", "send" or "cashout".
    pub tx_type: String,

    /// Originating account. Always present.
    pub from_account: Uuid,

    /// Receiving account. Present only for sends (the project creator).
    pub to_account: Option<Uuid>,

    /// Target project. Present only for sends.
    pub project_id: Option<Uuid>,

    /// Gross amount in coins. Always positive.
    pub amount: i64,

    /// Fee withheld. Nonzero only for cashouts.
    pub fee: i64,

    /// Amount minus fee. The figure actually paid out on cashout.
    pub net_amount: i64,

    /// Payment processor checkout session id. Unique when present;
    /// correlates exactly one session to exactly one transaction.
    pub external_session_id: Option<String>,

    /// Payment processor payment reference, attached on completion.
    pub external_payment_id: Option<String>,

    /// "pending", "completed", "failed" or "cancelled".
    pub status: String,

    /// Human-readable description for history views.
    pub description: String,

    /// When the transaction was created.
    pub created_at: DateTime<Utc>,

    /// When the transaction was last updated.
    pub updated_at: DateTime<Utc>,
}

/// A history row joined with counterparty names for display.
#[derive(Debug, Clone)]
pub struct HistoryRow {
    pub tx: TransactionRecord,
    pub from_username: Option<String>,
    pub to_username: Option<String>,
    pub project_title: Option<String>,
}

/// Reconciliation log entry.
///
/// Records the result of comparing an account's live balance against
/// the balance implied by the transaction log. A nonzero difference
/// means a crash or manual intervention left the two out of sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationLog {
    /// Unique log ID.
    pub id: Uuid,

    /// The account being reconciled.
    pub account_id: Option<Uuid>,

    /// Balance implied by the transaction log.
    pub expected_balance: i64,

    /// Live balance found on the account row.
    pub actual_balance: i64,

    /// actual - expected.
    pub difference: i64,

    /// Notes about the reconciliation.
    pub notes: Option<String>,

    /// When reconciliation was performed.
    pub created_at: DateTime<Utc>,
}

/// Platform-wide totals aggregated from completed transactions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformStats {
    /// Total coins bought (completed purchases).
    pub coins_bought: i64,

    /// Total coins sent to projects.
    pub coins_sent: i64,

    /// Total coins cashed out (completed cashouts, gross).
    pub coins_cashed_out: i64,

    /// Total fees withheld on completed cashouts.
    pub fees_earned: i64,

    /// Number of completed transactions.
    pub completed_transactions: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for s in ["pending", "completed", "failed", "cancelled"] {
            assert_eq!(TransactionStatus::parse(s).unwrap().as_str(), s);
        }
        assert!(TransactionStatus::parse("unknown").is_none());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!TransactionStatus::Pending.is_terminal());
        assert!(TransactionStatus::Completed.is_terminal());
        assert!(TransactionStatus::Failed.is_terminal());
        assert!(TransactionStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_payout_destination_present() {
        let mut account = AccountRecord {
            id: Uuid::new_v4(),
            username: "sara".to_string(),
            email: "sara@example.com".to_string(),
            role: "user".to_string(),
            balance: 0,
            total_earned: 0,
            total_spent: 0,
            payout_account_name: None,
            payout_iban: None,
            payout_bank_name: None,
            suspended: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(!account.has_payout_destination());

        account.payout_iban = Some(String::new());
        assert!(!account.has_payout_destination());

        account.payout_iban = Some("SA0380000000608010167519".to_string());
        assert!(account.has_payout_destination());
    }
}
