//! # API Response Models
//!
//! Structures for outgoing API response bodies.
//! All responses are wrapped in a standard format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::models::{HistoryRow, PlatformStats};
use crate::db::queries::CashoutRequestRow;

/// Standard API response wrapper.
///
/// ## Success Response
///
/// ```json
/// { "success": true, "data": { ... }, "error": null }
/// ```
///
/// ## Error Response
///
/// ```json
/// {
///     "success": false,
///     "data": null,
///     "error": { "code": "INSUFFICIENT_BALANCE", "message": "..." }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    /// Whether the request was successful.
    pub success: bool,

    /// Response data (null on error).
    pub data: Option<T>,

    /// Error information (null on success).
    pub error: Option<ApiError>,
}

impl<T> ApiResponse<T> {
    /// Create a successful response with data.
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(code: &str, message: &str) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.to_string(),
                message: message.to_string(),
            }),
        }
    }
}

/// API error information.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Error code (e.g., "INSUFFICIENT_BALANCE").
    pub code: String,

    /// Human-readable error message.
    pub message: String,
}

/// Coin balance response.
///
/// Returned by `GET /coins/balance`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    /// Live coin balance.
    pub balance: i64,

    /// Lifetime credits from being paid.
    pub total_earned: i64,

    /// Lifetime debits.
    pub total_spent: i64,
}

/// Checkout session response.
///
/// Returned by `POST /coins/buy`; the client redirects to `url`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    /// Checkout session id, later used by confirm/webhook.
    pub session_id: String,

    /// Hosted checkout page URL.
    pub url: String,
}

/// Purchase confirmation response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmResponse {
    /// Balance after (or without, if already settled) crediting.
    pub balance: i64,

    /// Human-readable outcome message.
    pub message: String,
}

/// Send-to-project response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResponse {
    /// Sender balance after the debit.
    pub balance: i64,

    /// Human-readable outcome message.
    pub message: String,
}

/// Fee breakdown for a cashout request.
///
/// The two fee rates are applied to the gross amount independently,
/// each rounded up, then summed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeBreakdown {
    /// Requested gross amount.
    pub gross_amount: i64,

    /// Processing fee (rounded up).
    pub processing_fee: i64,

    /// Bank transfer fee (rounded up).
    pub bank_fee: i64,

    /// processing_fee + bank_fee.
    pub total_fee: i64,

    /// gross_amount - total_fee. The figure actually paid out.
    pub net_amount: i64,
}

/// Cashout request response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashoutResponse {
    /// Fee breakdown for the request.
    pub details: FeeBreakdown,

    /// Balance after the gross amount was debited.
    pub balance: i64,

    /// Human-readable outcome message.
    pub message: String,
}

/// A transaction as presented in history and admin views.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResponse {
    /// Transaction ID.
    pub id: Uuid,

    /// "purchase", "send" or "cashout".
    #[serde(rename = "type")]
    pub tx_type: String,

    /// Sender username.
    pub from: Option<String>,

    /// Recipient username (sends only).
    pub to: Option<String>,

    /// Project title (sends only).
    pub project: Option<String>,

    /// Gross amount.
    pub amount: i64,

    /// Fee withheld (cashouts only).
    pub fee: i64,

    /// Amount minus fee.
    pub net_amount: i64,

    /// Current status.
    pub status: String,

    /// Human-readable description.
    pub description: String,

    /// When the transaction was created.
    pub created_at: DateTime<Utc>,
}

impl From<HistoryRow> for TransactionResponse {
    fn from(row: HistoryRow) -> Self {
        Self {
            id: row.tx.id,
            tx_type: row.tx.tx_type,
            from: row.from_username,
            to: row.to_username,
            project: row.project_title,
            amount: row.tx.amount,
            fee: row.tx.fee,
            net_amount: row.tx.net_amount,
            status: row.tx.status,
            description: row.tx.description,
            created_at: row.tx.created_at,
        }
    }
}

/// Pagination envelope for history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    /// 1-based page number.
    pub page: i64,

    /// Page size.
    pub limit: i64,

    /// Total matching rows.
    pub total: i64,

    /// Total pages.
    pub pages: i64,
}

/// Transaction history response with pagination.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    /// Page of transactions, newest first.
    pub data: Vec<TransactionResponse>,

    /// Pagination metadata.
    pub pagination: Pagination,
}

/// A cashout request as shown to the operator, with the requester's
/// payout destination alongside.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashoutRequestResponse {
    /// The underlying transaction id.
    pub id: Uuid,

    /// Requesting account's username.
    pub username: String,

    /// Requesting account's email.
    pub email: String,

    /// Gross amount debited at request time.
    pub amount: i64,

    /// Total fee withheld on approval.
    pub fee: i64,

    /// Amount to transfer to the bank.
    pub net_amount: i64,

    /// Current status.
    pub status: String,

    /// Payout destination: account holder name.
    pub payout_account_name: Option<String>,

    /// Payout destination: IBAN.
    pub payout_iban: Option<String>,

    /// Payout destination: bank name.
    pub payout_bank_name: Option<String>,

    /// When the request was made.
    pub created_at: DateTime<Utc>,
}

impl From<CashoutRequestRow> for CashoutRequestResponse {
    fn from(row: CashoutRequestRow) -> Self {
        Self {
            id: row.tx.id,
            username: row.username,
            email: row.email,
            amount: row.tx.amount,
            fee: row.tx.fee,
            net_amount: row.tx.net_amount,
            status: row.tx.status,
            payout_account_name: row.payout_account_name,
            payout_iban: row.payout_iban,
            payout_bank_name: row.payout_bank_name,
            created_at: row.tx.created_at,
        }
    }
}

/// Resolved cashout response (operator view).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedCashoutResponse {
    /// The transaction id.
    pub id: Uuid,

    /// Terminal status after resolution.
    pub status: String,

    /// Gross amount. Refunded in full when the decision was "failed".
    pub amount: i64,

    /// Net amount paid out when the decision was "completed".
    pub net_amount: i64,
}

/// Platform statistics response.
///
/// Returned by `GET /admin/stats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    /// Total coins bought (completed purchases).
    pub coins_bought: i64,

    /// Total coins sent to projects.
    pub coins_sent: i64,

    /// Total coins cashed out, gross.
    pub coins_cashed_out: i64,

    /// Total fees withheld on cashouts. Platform revenue.
    pub fees_earned: i64,

    /// Number of completed transactions.
    pub completed_transactions: i64,

    /// When the stats were computed.
    pub timestamp: DateTime<Utc>,
}

impl StatsResponse {
    pub fn from_stats(stats: PlatformStats, timestamp: DateTime<Utc>) -> Self {
        Self {
            coins_bought: stats.coins_bought,
            coins_sent: stats.coins_sent,
            coins_cashed_out: stats.coins_cashed_out,
            fees_earned: stats.fees_earned,
            completed_transactions: stats.completed_transactions,
            timestamp,
        }
    }
}

/// Saved payout destination response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankAccountResponse {
    /// Account holder name.
    pub account_name: String,

    /// Normalized IBAN.
    pub iban: String,

    /// Bank name.
    pub bank_name: String,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Service status: "healthy" or "unhealthy".
    pub status: String,

    /// Database connection status.
    pub database: bool,

    /// Whether the payment processor is configured.
    pub payments_configured: bool,

    /// Service version.
    pub version: String,

    /// Current timestamp.
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_shapes() {
        let ok = ApiResponse::success(BalanceResponse {
            balance: 40,
            total_earned: 0,
            total_spent: 60,
        });
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["balance"], 40);
        assert_eq!(json["data"]["totalEarned"], 0);
        assert!(json["error"].is_null());

        let err = ApiResponse::<()>::error("INSUFFICIENT_BALANCE", "Insufficient balance");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["code"], "INSUFFICIENT_BALANCE");
    }

    #[test]
    fn test_fee_breakdown_serializes_camel_case() {
        let fees = FeeBreakdown {
            gross_amount: 500,
            processing_fee: 40,
            bank_fee: 30,
            total_fee: 70,
            net_amount: 430,
        };
        let json = serde_json::to_value(&fees).unwrap();
        assert_eq!(json["grossAmount"], 500);
        assert_eq!(json["netAmount"], 430);
    }
}
