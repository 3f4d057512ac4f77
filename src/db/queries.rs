//! # Database Queries
//!
//! This module contains all the SQL for the ledger. Read-only queries
//! take the connection pool; balance-mutating primitives take an open
//! `Transaction` so callers compose them into one atomic unit of work.
//!
//! ## Atomicity discipline
//!
//! Every query that decreases a balance is a single conditional update
//! (`UPDATE ... WHERE balance >= amount RETURNING ...`). The check and
//! the mutation are one statement; two concurrent debits that jointly
//! exceed the balance serialize to exactly one success. The same
//! discipline applies to finalizing a pending transaction
//! (`WHERE status = 'pending' RETURNING ...`).

use deadpool_postgres::Pool;
use tokio_postgres::{Row, Transaction};
use tracing::debug;
use uuid::Uuid;

use super::models::*;
use super::DatabaseError;

// ============================================
// HELPER FUNCTIONS
// ============================================

fn row_to_account(row: &Row) -> AccountRecord {
    AccountRecord {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        role: row.get("role"),
        balance: row.get("balance"),
        total_earned: row.get("total_earned"),
        total_spent: row.get("total_spent"),
        payout_account_name: row.get("payout_account_name"),
        payout_iban: row.get("payout_iban"),
        payout_bank_name: row.get("payout_bank_name"),
        suspended: row.get("suspended"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_project(row: &Row) -> ProjectRecord {
    ProjectRecord {
        id: row.get("id"),
        serial_number: row.get("serial_number"),
        title: row.get("title"),
        category: row.get("category"),
        goal_amount: row.get("goal_amount"),
        current_amount: row.get("current_amount"),
        deadline: row.get("deadline"),
        creator: row.get("creator"),
        status: row.get("status"),
        created_at: row.get("created_at"),
    }
}

fn row_to_transaction(row: &Row) -> TransactionRecord {
    TransactionRecord {
        id: row.get("id"),
        tx_type: row.get("tx_type"),
        from_account: row.get("from_account"),
        to_account: row.get("to_account"),
        project_id: row.get("project_id"),
        amount: row.get("amount"),
        fee: row.get("fee"),
        net_amount: row.get("net_amount"),
        external_session_id: row.get("external_session_id"),
        external_payment_id: row.get("external_payment_id"),
        status: row.get("status"),
        description: row.get("description"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const TX_COLUMNS: &str = "id, tx_type, from_account, to_account, project_id, amount, fee, \
     net_amount, external_session_id, external_payment_id, status, description, \
     created_at, updated_at";

// ============================================
// ACCOUNT QUERIES
// ============================================

/// Create a new account row with balance 0.
///
/// Called at signup by the account directory integration.
pub async fn create_account(pool: &Pool, account: &AccountRecord) -> Result<(), DatabaseError> {
    debug!("Creating account: {}", account.username);

    let client = pool
        .get()
        .await
        .map_err(|e| DatabaseError::ConnectionError(e.to_string()))?;

    client
        .execute(
            r#"
            INSERT INTO accounts (
                id, username, email, role, balance, total_earned, total_spent,
                payout_account_name, payout_iban, payout_bank_name, suspended,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
            &[
                &account.id,
                &account.username,
                &account.email,
                &account.role,
                &account.balance,
                &account.total_earned,
                &account.total_spent,
                &account.payout_account_name,
                &account.payout_iban,
                &account.payout_bank_name,
                &account.suspended,
                &account.created_at,
                &account.updated_at,
            ],
        )
        .await?;

    Ok(())
}

/// Get an account by id.
pub async fn get_account(pool: &Pool, id: Uuid) -> Result<Option<AccountRecord>, DatabaseError> {
    let client = pool
        .get()
        .await
        .map_err(|e| DatabaseError::ConnectionError(e.to_string()))?;

    let rows = client
        .query("SELECT * FROM accounts WHERE id = $1", &[&id])
        .await?;

    Ok(rows.first().map(row_to_account))
}

/// Get just the live balance of an account.
pub async fn get_account_balance(pool: &Pool, id: Uuid) -> Result<Option<i64>, DatabaseError> {
    let client = pool
        .get()
        .await
        .map_err(|e| DatabaseError::ConnectionError(e.to_string()))?;

    let rows = client
        .query("SELECT balance FROM accounts WHERE id = $1", &[&id])
        .await?;

    Ok(rows.first().map(|r| r.get("balance")))
}

/// Save the account's payout destination (bank details).
pub async fn update_payout_destination(
    pool: &Pool,
    id: Uuid,
    account_name: &str,
    iban: &str,
    bank_name: &str,
) -> Result<(), DatabaseError> {
    let client = pool
        .get()
        .await
        .map_err(|e| DatabaseError::ConnectionError(e.to_string()))?;

    let rows_affected = client
        .execute(
            r#"
            UPDATE accounts
            SET payout_account_name = $2,
                payout_iban = $3,
                payout_bank_name = $4,
                updated_at = NOW()
            WHERE id = $1
            "#,
            &[&id, &account_name, &iban, &bank_name],
        )
        .await?;

    if rows_affected == 0 {
        return Err(DatabaseError::NotFound(format!("Account not found: {}", id)));
    }

    Ok(())
}

/// Atomically debit an account: decrement `balance`, increment
/// `total_spent`, but only if the balance covers the amount.
///
/// Returns the new balance, or `None` when the balance was insufficient
/// at the moment of mutation. This is the linearization point for sends
/// and cashouts; there is no separate pre-check.
pub async fn debit_account(
    txn: &Transaction<'_>,
    id: Uuid,
    amount: i64,
) -> Result<Option<i64>, DatabaseError> {
    debug!("Debiting account {} by {}", id, amount);

    let rows = txn
        .query(
            r#"
            UPDATE accounts
            SET balance = balance - $2,
                total_spent = total_spent + $2,
                updated_at = NOW()
            WHERE id = $1 AND balance >= $2
            RETURNING balance
            "#,
            &[&id, &amount],
        )
        .await?;

    Ok(rows.first().map(|r| r.get("balance")))
}

/// Credit earnings to an account: increment `balance` and `total_earned`.
/// Used for the project-creator side of a send.
pub async fn credit_earnings(
    txn: &Transaction<'_>,
    id: Uuid,
    amount: i64,
) -> Result<(), DatabaseError> {
    let rows_affected = txn
        .execute(
            r#"
            UPDATE accounts
            SET balance = balance + $2,
                total_earned = total_earned + $2,
                updated_at = NOW()
            WHERE id = $1
            "#,
            &[&id, &amount],
        )
        .await?;

    if rows_affected == 0 {
        return Err(DatabaseError::NotFound(format!("Account not found: {}", id)));
    }

    Ok(())
}

/// Credit purchased coins to an account.
///
/// Increments `balance` only - a purchase is not earnings, so
/// `total_earned` stays put. Returns the new balance.
pub async fn credit_purchase(
    txn: &Transaction<'_>,
    id: Uuid,
    amount: i64,
) -> Result<Option<i64>, DatabaseError> {
    let rows = txn
        .query(
            r#"
            UPDATE accounts
            SET balance = balance + $2,
                updated_at = NOW()
            WHERE id = $1
            RETURNING balance
            "#,
            &[&id, &amount],
        )
        .await?;

    Ok(rows.first().map(|r| r.get("balance")))
}

/// Reverse a cashout debit in full: restore `balance` and decrement
/// `total_spent` by the gross amount. The fee is never charged on
/// rejection.
pub async fn refund_cashout(
    txn: &Transaction<'_>,
    id: Uuid,
    amount: i64,
) -> Result<(), DatabaseError> {
    let rows_affected = txn
        .execute(
            r#"
            UPDATE accounts
            SET balance = balance + $2,
                total_spent = total_spent - $2,
                updated_at = NOW()
            WHERE id = $1
            "#,
            &[&id, &amount],
        )
        .await?;

    if rows_affected == 0 {
        return Err(DatabaseError::NotFound(format!("Account not found: {}", id)));
    }

    Ok(())
}

// ============================================
// PROJECT QUERIES
// ============================================

/// Get a project by id.
pub async fn get_project(pool: &Pool, id: Uuid) -> Result<Option<ProjectRecord>, DatabaseError> {
    let client = pool
        .get()
        .await
        .map_err(|e| DatabaseError::ConnectionError(e.to_string()))?;

    let rows = client
        .query("SELECT * FROM projects WHERE id = $1", &[&id])
        .await?;

    Ok(rows.first().map(row_to_project))
}

/// Create a project funding record.
pub async fn create_project(pool: &Pool, project: &ProjectRecord) -> Result<(), DatabaseError> {
    let client = pool
        .get()
        .await
        .map_err(|e| DatabaseError::ConnectionError(e.to_string()))?;

    client
        .execute(
            r#"
            INSERT INTO projects (
                id, serial_number, title, category, goal_amount, current_amount,
                deadline, creator, status, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
            &[
                &project.id,
                &project.serial_number,
                &project.title,
                &project.category,
                &project.goal_amount,
                &project.current_amount,
                &project.deadline,
                &project.creator,
                &project.status,
                &project.created_at,
            ],
        )
        .await?;

    Ok(())
}

/// Add funds to a project's running total.
pub async fn increment_project_funding(
    txn: &Transaction<'_>,
    id: Uuid,
    amount: i64,
) -> Result<(), DatabaseError> {
    let rows_affected = txn
        .execute(
            r#"
            UPDATE projects
            SET current_amount = current_amount + $2
            WHERE id = $1
            "#,
            &[&id, &amount],
        )
        .await?;

    if rows_affected == 0 {
        return Err(DatabaseError::NotFound(format!("Project not found: {}", id)));
    }

    Ok(())
}

// ============================================
// TRANSACTION QUERIES
// ============================================

/// Insert a transaction log row.
pub async fn insert_transaction(
    txn: &Transaction<'_>,
    tx: &TransactionRecord,
) -> Result<Uuid, DatabaseError> {
    debug!("Recording {} transaction {}", tx.tx_type, tx.id);

    txn.execute(
        r#"
        INSERT INTO transactions (
            id, tx_type, from_account, to_account, project_id, amount, fee,
            net_amount, external_session_id, external_payment_id, status,
            description, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        "#,
        &[
            &tx.id,
            &tx.tx_type,
            &tx.from_account,
            &tx.to_account,
            &tx.project_id,
            &tx.amount,
            &tx.fee,
            &tx.net_amount,
            &tx.external_session_id,
            &tx.external_payment_id,
            &tx.status,
            &tx.description,
            &tx.created_at,
            &tx.updated_at,
        ],
    )
    .await?;

    Ok(tx.id)
}

/// Get a transaction by id.
pub async fn get_transaction(
    pool: &Pool,
    id: Uuid,
) -> Result<Option<TransactionRecord>, DatabaseError> {
    let client = pool
        .get()
        .await
        .map_err(|e| DatabaseError::ConnectionError(e.to_string()))?;

    let rows = client
        .query("SELECT * FROM transactions WHERE id = $1", &[&id])
        .await?;

    Ok(rows.first().map(row_to_transaction))
}

/// Finalize a pending purchase for the given checkout session.
///
/// Transitions `pending -> completed` and attaches the processor's
/// payment reference, but only if the row is still pending. Returns the
/// updated row if the transition actually fired, `None` if the session
/// was already consumed (or never existed). The caller credits the
/// buyer only when this returns `Some`.
pub async fn complete_purchase_by_session(
    txn: &Transaction<'_>,
    session_id: &str,
    payment_id: Option<&str>,
) -> Result<Option<TransactionRecord>, DatabaseError> {
    let sql = format!(
        r#"
        UPDATE transactions
        SET status = 'completed',
            external_payment_id = $2,
            updated_at = NOW()
        WHERE external_session_id = $1 AND status = 'pending'
        RETURNING {TX_COLUMNS}
        "#
    );
    let rows = txn.query(sql.as_str(), &[&session_id, &payment_id]).await?;

    Ok(rows.first().map(row_to_transaction))
}

/// Resolve a pending cashout to a terminal state.
///
/// Fires only while the row is `pending`; a second resolution attempt
/// matches nothing and returns `None`.
pub async fn resolve_cashout(
    txn: &Transaction<'_>,
    id: Uuid,
    status: TransactionStatus,
) -> Result<Option<TransactionRecord>, DatabaseError> {
    let sql = format!(
        r#"
        UPDATE transactions
        SET status = $2,
            updated_at = NOW()
        WHERE id = $1 AND tx_type = 'cashout' AND status = 'pending'
        RETURNING {TX_COLUMNS}
        "#
    );
    let rows = txn.query(sql.as_str(), &[&id, &status.as_str()]).await?;

    Ok(rows.first().map(row_to_transaction))
}

/// Get an account's transaction history (newest first).
///
/// Failed rows are excluded, matching what users expect to see in a
/// wallet view. Counterparty usernames and the project title are joined
/// in for display.
pub async fn get_history(
    pool: &Pool,
    account_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<HistoryRow>, DatabaseError> {
    debug!("Fetching history for account: {}", account_id);

    let client = pool
        .get()
        .await
        .map_err(|e| DatabaseError::ConnectionError(e.to_string()))?;

    let rows = client
        .query(
            r#"
            SELECT t.*,
                   fa.username AS from_username,
                   ta.username AS to_username,
                   p.title AS project_title
            FROM transactions t
            JOIN accounts fa ON fa.id = t.from_account
            LEFT JOIN accounts ta ON ta.id = t.to_account
            LEFT JOIN projects p ON p.id = t.project_id
            WHERE (t.from_account = $1 OR t.to_account = $1)
              AND t.status <> 'failed'
            ORDER BY t.created_at DESC
            LIMIT $2 OFFSET $3
            "#,
            &[&account_id, &limit, &offset],
        )
        .await?;

    Ok(rows
        .iter()
        .map(|row| HistoryRow {
            tx: row_to_transaction(row),
            from_username: row.get("from_username"),
            to_username: row.get("to_username"),
            project_title: row.get("project_title"),
        })
        .collect())
}

/// Count the rows `get_history` would return, for pagination.
pub async fn count_history(pool: &Pool, account_id: Uuid) -> Result<i64, DatabaseError> {
    let client = pool
        .get()
        .await
        .map_err(|e| DatabaseError::ConnectionError(e.to_string()))?;

    let row = client
        .query_one(
            r#"
            SELECT COUNT(*) AS total
            FROM transactions
            WHERE (from_account = $1 OR to_account = $1)
              AND status <> 'failed'
            "#,
            &[&account_id],
        )
        .await?;

    Ok(row.get("total"))
}

/// List cashout requests in the given status (newest first), joined
/// with the requesting account's payout destination for the operator.
pub async fn list_cashouts(
    pool: &Pool,
    status: TransactionStatus,
) -> Result<Vec<CashoutRequestRow>, DatabaseError> {
    let client = pool
        .get()
        .await
        .map_err(|e| DatabaseError::ConnectionError(e.to_string()))?;

    let rows = client
        .query(
            r#"
            SELECT t.*,
                   a.username,
                   a.email,
                   a.payout_account_name AS req_account_name,
                   a.payout_iban AS req_iban,
                   a.payout_bank_name AS req_bank_name
            FROM transactions t
            JOIN accounts a ON a.id = t.from_account
            WHERE t.tx_type = 'cashout' AND t.status = $1
            ORDER BY t.created_at DESC
            "#,
            &[&status.as_str()],
        )
        .await?;

    Ok(rows
        .iter()
        .map(|row| CashoutRequestRow {
            tx: row_to_transaction(row),
            username: row.get("username"),
            email: row.get("email"),
            payout_account_name: row.get("req_account_name"),
            payout_iban: row.get("req_iban"),
            payout_bank_name: row.get("req_bank_name"),
        })
        .collect())
}

/// A cashout request joined with the requester's payout details.
#[derive(Debug, Clone)]
pub struct CashoutRequestRow {
    pub tx: TransactionRecord,
    pub username: String,
    pub email: String,
    pub payout_account_name: Option<String>,
    pub payout_iban: Option<String>,
    pub payout_bank_name: Option<String>,
}

// ============================================
// STATS QUERIES
// ============================================

/// Platform totals aggregated over completed transactions.
pub async fn get_platform_stats(pool: &Pool) -> Result<PlatformStats, DatabaseError> {
    let client = pool
        .get()
        .await
        .map_err(|e| DatabaseError::ConnectionError(e.to_string()))?;

    let row = client
        .query_one(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN tx_type = 'purchase' THEN amount END), 0)::BIGINT AS coins_bought,
                COALESCE(SUM(CASE WHEN tx_type = 'send' THEN amount END), 0)::BIGINT AS coins_sent,
                COALESCE(SUM(CASE WHEN tx_type = 'cashout' THEN amount END), 0)::BIGINT AS coins_cashed_out,
                COALESCE(SUM(CASE WHEN tx_type = 'cashout' THEN fee END), 0)::BIGINT AS fees_earned,
                COUNT(*) AS completed_transactions
            FROM transactions
            WHERE status = 'completed'
            "#,
            &[],
        )
        .await?;

    Ok(PlatformStats {
        coins_bought: row.get("coins_bought"),
        coins_sent: row.get("coins_sent"),
        coins_cashed_out: row.get("coins_cashed_out"),
        fees_earned: row.get("fees_earned"),
        completed_transactions: row.get("completed_transactions"),
    })
}

// ============================================
// RECONCILIATION QUERIES
// ============================================

/// For every account, compute the balance implied by the transaction
/// log next to the live balance.
///
/// Expected balance = completed purchases in + completed sends in
/// - completed sends out - non-failed cashouts out. Pending cashouts
/// count as spent because the debit happened at request time.
pub async fn audit_balances(pool: &Pool) -> Result<Vec<(Uuid, i64, i64)>, DatabaseError> {
    let client = pool
        .get()
        .await
        .map_err(|e| DatabaseError::ConnectionError(e.to_string()))?;

    let rows = client
        .query(
            r#"
            SELECT a.id,
                   a.balance,
                   COALESCE(SUM(CASE
                       WHEN t.tx_type = 'purchase' AND t.status = 'completed'
                            AND t.from_account = a.id THEN t.amount
                       WHEN t.tx_type = 'send' AND t.status = 'completed'
                            AND t.to_account = a.id THEN t.amount
                       WHEN t.tx_type = 'send' AND t.status = 'completed'
                            AND t.from_account = a.id THEN -t.amount
                       WHEN t.tx_type = 'cashout' AND t.status IN ('pending', 'completed')
                            AND t.from_account = a.id THEN -t.amount
                       ELSE 0
                   END), 0)::BIGINT AS expected
            FROM accounts a
            LEFT JOIN transactions t
                ON t.from_account = a.id OR t.to_account = a.id
            GROUP BY a.id, a.balance
            "#,
            &[],
        )
        .await?;

    Ok(rows
        .iter()
        .map(|row| (row.get("id"), row.get("balance"), row.get("expected")))
        .collect())
}

/// Log a reconciliation result.
pub async fn insert_reconciliation_log(
    pool: &Pool,
    log: &ReconciliationLog,
) -> Result<Uuid, DatabaseError> {
    let client = pool
        .get()
        .await
        .map_err(|e| DatabaseError::ConnectionError(e.to_string()))?;

    client
        .execute(
            r#"
            INSERT INTO reconciliation_logs (
                id, account_id, expected_balance, actual_balance,
                difference, notes, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
            &[
                &log.id,
                &log.account_id,
                &log.expected_balance,
                &log.actual_balance,
                &log.difference,
                &log.notes,
                &log.created_at,
            ],
        )
        .await?;

    Ok(log.id)
}
