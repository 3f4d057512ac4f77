//! # Ledger Service
//!
//! The LedgerService is the transfer engine: it executes the four
//! value-movement operations (buy, send, cashout, resolve-cashout) and
//! the read paths (balance, history), each atomic with respect to
//! concurrent operations on the same accounts.
//!
//! ## Atomicity
//!
//! Every operation that moves value runs inside one Postgres
//! transaction. The debit is always the linearization point: a single
//! conditional update (`WHERE balance >= amount`) that checks and
//! decrements in one statement. A send's other three writes (creator
//! credit, project total, log row) commit together with the debit, so
//! no observer sees a half-moved transfer.
//!
//! ## Flow Example: Send
//!
//! ```text
//! 1. Validate amount, project status, no self-funding
//!                ↓
//! 2. BEGIN
//! 3. Conditional debit of sender (fails -> InsufficientBalance)
//! 4. Credit project creator (+balance, +totalEarned)
//! 5. Increment project currentAmount
//! 6. Insert completed transaction row
//! 7. COMMIT
//! ```

use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::db::queries::{self, CashoutRequestRow};
use crate::db::{
    Database, DatabaseError, HistoryRow, PlatformStats, ProjectStatus, TransactionRecord,
    TransactionStatus, TransactionType,
};
use crate::models::{
    BalanceResponse, CashoutResponse, CheckoutResponse, FeeBreakdown, SendResponse,
};
use crate::payments::{PaymentError, StripeClient};
use crate::utils;

/// Errors that can occur in ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Amount outside the allowed range for the operation.
    #[error("{0}")]
    InvalidAmount(String),

    /// Non-amount input validation failure.
    #[error("{0}")]
    InvalidInput(String),

    /// The conditional debit found less balance than requested.
    #[error("Insufficient balance")]
    InsufficientBalance,

    /// Only active projects may receive funds.
    #[error("Project is not active")]
    ProjectNotActive,

    /// Creators cannot back their own projects.
    #[error("You cannot back your own project")]
    SelfFundingNotAllowed,

    /// Cashout requires a saved payout destination.
    #[error("Add your bank account details before cashing out")]
    PayoutDestinationMissing,

    /// The transaction was already resolved or reconciled.
    #[error("This request has already been processed")]
    AlreadyProcessed,

    /// The payment processor is not configured.
    #[error("Payment service not configured")]
    PaymentServiceUnavailable,

    /// The processor could not confirm the session, or it belongs to
    /// someone else.
    #[error("Payment verification failed: {0}")]
    ExternalVerificationFailed(String),

    /// Account, project or transaction not found.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Caller is not allowed to perform this operation.
    #[error("Not authorized")]
    Unauthorized,

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Payment processor call failed.
    #[error(transparent)]
    Payment(#[from] PaymentError),
}

impl LedgerError {
    /// Stable error code for the API envelope.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InvalidAmount(_) => "INVALID_AMOUNT",
            LedgerError::InvalidInput(_) => "INVALID_INPUT",
            LedgerError::InsufficientBalance => "INSUFFICIENT_BALANCE",
            LedgerError::ProjectNotActive => "PROJECT_NOT_ACTIVE",
            LedgerError::SelfFundingNotAllowed => "SELF_FUNDING_NOT_ALLOWED",
            LedgerError::PayoutDestinationMissing => "PAYOUT_DESTINATION_MISSING",
            LedgerError::AlreadyProcessed => "ALREADY_PROCESSED",
            LedgerError::PaymentServiceUnavailable => "PAYMENT_SERVICE_UNAVAILABLE",
            LedgerError::ExternalVerificationFailed(_) => "EXTERNAL_VERIFICATION_FAILED",
            LedgerError::NotFound(_) => "NOT_FOUND",
            LedgerError::Unauthorized => "UNAUTHORIZED",
            LedgerError::Database(_) => "DATABASE_ERROR",
            LedgerError::Payment(_) => "PAYMENT_ERROR",
        }
    }
}

/// Operator decision on a pending cashout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CashoutDecision {
    /// The external payout succeeded; no balance mutation.
    Approve,
    /// The payout was rejected; refund the gross amount.
    Reject,
}

impl CashoutDecision {
    /// Parse the wire form used by the resolve endpoint.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "completed" => Some(CashoutDecision::Approve),
            "failed" => Some(CashoutDecision::Reject),
            _ => None,
        }
    }

    fn terminal_status(self) -> TransactionStatus {
        match self {
            CashoutDecision::Approve => TransactionStatus::Completed,
            CashoutDecision::Reject => TransactionStatus::Failed,
        }
    }
}

/// Compute the cashout fee breakdown.
///
/// The two rates are applied to the gross amount independently, each
/// rounded up, then summed. (Rounding once on the combined rate would
/// occasionally differ by one coin; the split-and-ceil form is the
/// platform's published fee schedule.)
pub fn cashout_fees(amount: i64, processing_rate: f64, transfer_rate: f64) -> FeeBreakdown {
    let processing_fee = (amount as f64 * processing_rate).ceil() as i64;
    let bank_fee = (amount as f64 * transfer_rate).ceil() as i64;
    let total_fee = processing_fee + bank_fee;
    FeeBreakdown {
        gross_amount: amount,
        processing_fee,
        bank_fee,
        total_fee,
        net_amount: amount - total_fee,
    }
}

/// The transfer engine.
///
/// Holds the database handle and the optional payment client; both are
/// constructed at startup and passed in explicitly.
#[derive(Clone)]
pub struct LedgerService {
    /// Database connection for ledger state.
    db: Database,

    /// Payment processor client. `None` when no API key is configured;
    /// purchases are then rejected with a typed error.
    payments: Option<StripeClient>,

    /// Application configuration (caps, thresholds, fee rates).
    config: AppConfig,
}

impl LedgerService {
    /// Create a new LedgerService instance.
    pub fn new(db: Database, payments: Option<StripeClient>, config: AppConfig) -> Self {
        Self {
            db,
            payments,
            config,
        }
    }

    // ==========================================
    // READ PATHS
    // ==========================================

    /// Get an account's balance and lifetime counters.
    pub async fn get_balance(&self, account_id: Uuid) -> Result<BalanceResponse, LedgerError> {
        let account = queries::get_account(self.db.pool(), account_id)
            .await?
            .ok_or(LedgerError::NotFound("Account"))?;

        Ok(BalanceResponse {
            balance: account.balance,
            total_earned: account.total_earned,
            total_spent: account.total_spent,
        })
    }

    /// Get a page of the account's transaction history.
    ///
    /// Returns `(rows, total)`. `limit` is capped at 100.
    pub async fn history(
        &self,
        account_id: Uuid,
        page: i64,
        limit: i64,
    ) -> Result<(Vec<HistoryRow>, i64), LedgerError> {
        let page = page.max(1);
        let limit = limit.clamp(1, 100);
        let offset = (page - 1) * limit;

        let rows = queries::get_history(self.db.pool(), account_id, limit, offset).await?;
        let total = queries::count_history(self.db.pool(), account_id).await?;
        Ok((rows, total))
    }

    // ==========================================
    // BUY
    // ==========================================

    /// Initiate a coin purchase.
    ///
    /// Creates a checkout session with the processor and records a
    /// `pending` purchase transaction carrying the session id. The
    /// balance is untouched until reconciliation confirms payment.
    pub async fn buy_coins(
        &self,
        account_id: Uuid,
        amount: i64,
    ) -> Result<CheckoutResponse, LedgerError> {
        let payments = self
            .payments
            .as_ref()
            .ok_or(LedgerError::PaymentServiceUnavailable)?;

        if amount < 1 {
            return Err(LedgerError::InvalidAmount(
                "Minimum purchase is 1 coin".to_string(),
            ));
        }
        if amount > self.config.max_purchase {
            return Err(LedgerError::InvalidAmount(format!(
                "Maximum purchase is {} coins per transaction",
                self.config.max_purchase
            )));
        }

        let account = queries::get_account(self.db.pool(), account_id)
            .await?
            .ok_or(LedgerError::NotFound("Account"))?;

        let session = payments
            .create_checkout_session(account.id, &account.email, amount, &self.config.client_url)
            .await?;

        let url = session
            .url
            .clone()
            .ok_or_else(|| PaymentError::InvalidResponse("session has no URL".to_string()))?;

        let now = Utc::now();
        let record = TransactionRecord {
            id: Uuid::new_v4(),
            tx_type: TransactionType::Purchase.as_str().to_string(),
            from_account: account.id,
            to_account: None,
            project_id: None,
            amount,
            fee: 0,
            net_amount: amount,
            external_session_id: Some(session.id.clone()),
            external_payment_id: None,
            status: TransactionStatus::Pending.as_str().to_string(),
            description: format!("Purchase of {} coins", amount),
            created_at: now,
            updated_at: now,
        };

        let mut client = self
            .db
            .pool()
            .get()
            .await
            .map_err(|e| DatabaseError::ConnectionError(e.to_string()))?;
        let txn = client.transaction().await.map_err(DatabaseError::from)?;
        queries::insert_transaction(&txn, &record).await?;
        txn.commit().await.map_err(DatabaseError::from)?;

        info!(
            "Purchase initiated: account={} {} session={}",
            account.id,
            utils::format_coins(amount),
            session.id
        );

        Ok(CheckoutResponse {
            session_id: session.id,
            url,
        })
    }

    // ==========================================
    // SEND
    // ==========================================

    /// Send coins to a project.
    ///
    /// The sender debit, creator credit, project-total increment and
    /// log row commit as one Postgres transaction. The debit is
    /// conditional; insufficient balance is detected at mutation time,
    /// never by a separate pre-check.
    pub async fn send_to_project(
        &self,
        account_id: Uuid,
        project_id: Uuid,
        amount: i64,
    ) -> Result<SendResponse, LedgerError> {
        if amount < 1 {
            return Err(LedgerError::InvalidAmount(
                "Amount must be at least 1 coin".to_string(),
            ));
        }

        let project = queries::get_project(self.db.pool(), project_id)
            .await?
            .ok_or(LedgerError::NotFound("Project"))?;

        if ProjectStatus::parse(&project.status) != Some(ProjectStatus::Active) {
            return Err(LedgerError::ProjectNotActive);
        }
        if project.creator == account_id {
            return Err(LedgerError::SelfFundingNotAllowed);
        }

        let mut client = self
            .db
            .pool()
            .get()
            .await
            .map_err(|e| DatabaseError::ConnectionError(e.to_string()))?;
        let txn = client.transaction().await.map_err(DatabaseError::from)?;

        let new_balance = match queries::debit_account(&txn, account_id, amount).await? {
            Some(balance) => balance,
            None => {
                // Rolls back the (empty) transaction.
                return Err(LedgerError::InsufficientBalance);
            }
        };

        queries::credit_earnings(&txn, project.creator, amount).await?;
        queries::increment_project_funding(&txn, project.id, amount).await?;

        let now = Utc::now();
        let record = TransactionRecord {
            id: Uuid::new_v4(),
            tx_type: TransactionType::Send.as_str().to_string(),
            from_account: account_id,
            to_account: Some(project.creator),
            project_id: Some(project.id),
            amount,
            fee: 0,
            net_amount: amount,
            external_session_id: None,
            external_payment_id: None,
            status: TransactionStatus::Completed.as_str().to_string(),
            description: format!("Backed \"{}\" with {} coins", project.title, amount),
            created_at: now,
            updated_at: now,
        };
        queries::insert_transaction(&txn, &record).await?;

        txn.commit().await.map_err(DatabaseError::from)?;

        info!(
            "Send completed: from={} project={} amount={}",
            account_id, project.id, amount
        );

        Ok(SendResponse {
            balance: new_balance,
            message: format!("Successfully sent {} coins to \"{}\"", amount, project.title),
        })
    }

    // ==========================================
    // CASHOUT
    // ==========================================

    /// Request a cashout to the saved payout destination.
    ///
    /// Debits the gross amount immediately (suspense) and records a
    /// `pending` cashout transaction carrying the fee breakdown. An
    /// operator later resolves it via [`Self::resolve_cashout`].
    pub async fn request_cashout(
        &self,
        account_id: Uuid,
        amount: i64,
    ) -> Result<CashoutResponse, LedgerError> {
        if amount < self.config.min_cashout {
            return Err(LedgerError::InvalidAmount(format!(
                "Minimum cashout is {} coins",
                self.config.min_cashout
            )));
        }

        let account = queries::get_account(self.db.pool(), account_id)
            .await?
            .ok_or(LedgerError::NotFound("Account"))?;

        if !account.has_payout_destination() {
            return Err(LedgerError::PayoutDestinationMissing);
        }

        let fees = cashout_fees(
            amount,
            self.config.processing_fee_rate,
            self.config.transfer_fee_rate,
        );

        let mut client = self
            .db
            .pool()
            .get()
            .await
            .map_err(|e| DatabaseError::ConnectionError(e.to_string()))?;
        let txn = client.transaction().await.map_err(DatabaseError::from)?;

        let new_balance = match queries::debit_account(&txn, account_id, amount).await? {
            Some(balance) => balance,
            None => return Err(LedgerError::InsufficientBalance),
        };

        let now = Utc::now();
        let record = TransactionRecord {
            id: Uuid::new_v4(),
            tx_type: TransactionType::Cashout.as_str().to_string(),
            from_account: account_id,
            to_account: None,
            project_id: None,
            amount,
            fee: fees.total_fee,
            net_amount: fees.net_amount,
            external_session_id: None,
            external_payment_id: None,
            status: TransactionStatus::Pending.as_str().to_string(),
            description: format!(
                "Cashout {} coins -> {} SAR ({} SAR fees: {} processing + {} bank)",
                amount, fees.net_amount, fees.total_fee, fees.processing_fee, fees.bank_fee
            ),
            created_at: now,
            updated_at: now,
        };
        queries::insert_transaction(&txn, &record).await?;

        txn.commit().await.map_err(DatabaseError::from)?;

        info!(
            "Cashout requested: account={} gross={} net={}",
            account_id, amount, fees.net_amount
        );

        Ok(CashoutResponse {
            details: fees,
            balance: new_balance,
            message: format!(
                "Cashout request submitted. {} SAR will be transferred to your bank account.",
                record.net_amount
            ),
        })
    }

    /// Resolve a pending cashout (operator action).
    ///
    /// The `pending -> terminal` transition is conditional; a second
    /// resolution attempt finds nothing pending and gets
    /// `AlreadyProcessed`. Rejection refunds the gross amount in the
    /// same transaction as the status flip - the fee is never charged
    /// on rejection.
    pub async fn resolve_cashout(
        &self,
        operator_id: Uuid,
        transaction_id: Uuid,
        decision: CashoutDecision,
    ) -> Result<TransactionRecord, LedgerError> {
        self.require_operator(operator_id).await?;

        let mut client = self
            .db
            .pool()
            .get()
            .await
            .map_err(|e| DatabaseError::ConnectionError(e.to_string()))?;
        let txn = client.transaction().await.map_err(DatabaseError::from)?;

        let resolved =
            queries::resolve_cashout(&txn, transaction_id, decision.terminal_status()).await?;

        let record = match resolved {
            Some(record) => record,
            None => {
                // Distinguish "gone" from "already terminal" for the caller.
                drop(txn);
                return match queries::get_transaction(self.db.pool(), transaction_id).await? {
                    Some(existing)
                        if TransactionType::parse(&existing.tx_type)
                            == Some(TransactionType::Cashout) =>
                    {
                        Err(LedgerError::AlreadyProcessed)
                    }
                    _ => Err(LedgerError::NotFound("Cashout request")),
                };
            }
        };

        if decision == CashoutDecision::Reject {
            queries::refund_cashout(&txn, record.from_account, record.amount).await?;
            warn!(
                "Cashout rejected, refunded {} coins to {}",
                record.amount, record.from_account
            );
        }

        txn.commit().await.map_err(DatabaseError::from)?;

        info!(
            "Cashout {} resolved as {} by operator {}",
            record.id, record.status, operator_id
        );

        Ok(record)
    }

    /// List cashout requests by status (operator action).
    pub async fn list_cashouts(
        &self,
        operator_id: Uuid,
        status: TransactionStatus,
    ) -> Result<Vec<CashoutRequestRow>, LedgerError> {
        self.require_operator(operator_id).await?;
        Ok(queries::list_cashouts(self.db.pool(), status).await?)
    }

    /// Platform totals by transaction type (operator action).
    pub async fn platform_stats(&self, operator_id: Uuid) -> Result<PlatformStats, LedgerError> {
        self.require_operator(operator_id).await?;
        Ok(queries::get_platform_stats(self.db.pool()).await?)
    }

    // ==========================================
    // PAYOUT DESTINATION
    // ==========================================

    /// Save the account's payout destination after validating the IBAN.
    pub async fn update_payout_destination(
        &self,
        account_id: Uuid,
        account_name: &str,
        iban: &str,
        bank_name: &str,
    ) -> Result<String, LedgerError> {
        let account_name = account_name.trim();
        let bank_name = bank_name.trim();
        if account_name.is_empty() || bank_name.is_empty() {
            return Err(LedgerError::InvalidInput(
                "All bank account fields are required".to_string(),
            ));
        }

        let iban = utils::normalize_iban(iban);
        if !utils::is_valid_saudi_iban(&iban) {
            return Err(LedgerError::InvalidInput(
                "Enter a valid Saudi IBAN (starts with SA, 24 characters)".to_string(),
            ));
        }

        queries::update_payout_destination(
            self.db.pool(),
            account_id,
            account_name,
            &iban,
            bank_name,
        )
        .await
        .map_err(|e| match e {
            DatabaseError::NotFound(_) => LedgerError::NotFound("Account"),
            other => LedgerError::Database(other),
        })?;

        info!(
            "Payout destination saved: account={} iban={}",
            account_id,
            utils::mask_iban(&iban)
        );

        Ok(iban)
    }

    /// Require the caller to hold an operator role (admin or manager).
    async fn require_operator(&self, account_id: Uuid) -> Result<(), LedgerError> {
        let account = queries::get_account(self.db.pool(), account_id)
            .await?
            .ok_or(LedgerError::Unauthorized)?;

        match account.role.as_str() {
            "admin" | "manager" => Ok(()),
            _ => Err(LedgerError::Unauthorized),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cashout_fees_published_schedule() {
        // 500 coins at 8% + 6%: fee 40 + 30 = 70, net 430.
        let fees = cashout_fees(500, 0.08, 0.06);
        assert_eq!(fees.processing_fee, 40);
        assert_eq!(fees.bank_fee, 30);
        assert_eq!(fees.total_fee, 70);
        assert_eq!(fees.net_amount, 430);
    }

    #[test]
    fn test_cashout_fees_round_up_independently() {
        // 105 coins: 8% = 8.4 -> 9, 6% = 6.3 -> 7. Summing the ceils,
        // not ceiling the sum.
        let fees = cashout_fees(105, 0.08, 0.06);
        assert_eq!(fees.processing_fee, 9);
        assert_eq!(fees.bank_fee, 7);
        assert_eq!(fees.total_fee, 16);
        assert_eq!(fees.net_amount, 89);
    }

    #[test]
    fn test_cashout_fees_exact_boundary() {
        let fees = cashout_fees(100, 0.08, 0.06);
        assert_eq!(fees.total_fee, 14);
        assert_eq!(fees.net_amount, 86);
    }

    #[test]
    fn test_decision_parsing() {
        assert_eq!(CashoutDecision::parse("completed"), Some(CashoutDecision::Approve));
        assert_eq!(CashoutDecision::parse("failed"), Some(CashoutDecision::Reject));
        assert_eq!(CashoutDecision::parse("pending"), None);
        assert_eq!(CashoutDecision::parse(""), None);
    }

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(LedgerError::InsufficientBalance.code(), "INSUFFICIENT_BALANCE");
        assert_eq!(LedgerError::AlreadyProcessed.code(), "ALREADY_PROCESSED");
        assert_eq!(
            LedgerError::PaymentServiceUnavailable.code(),
            "PAYMENT_SERVICE_UNAVAILABLE"
        );
    }
}
