//! # API Request Models
//!
//! Structures for incoming API request bodies.
//! Each struct represents the expected JSON body for an endpoint.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request to buy coins.
///
/// ## Example JSON
///
/// ```json
/// { "amount": 200 }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyCoinsRequest {
    /// Coin amount to purchase. 1 coin = 1 SAR.
    pub amount: i64,
}

/// Request to confirm a purchase after checkout redirect.
///
/// The session must belong to the caller and be reported paid by the
/// processor before any crediting happens.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmPurchaseRequest {
    /// Checkout session id returned by the buy call.
    pub session_id: String,
}

/// Request to send coins to a project.
///
/// ## Example JSON
///
/// ```json
/// { "projectId": "550e8400-e29b-41d4-a716-446655440000", "amount": 50 }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendCoinsRequest {
    /// Target project id.
    pub project_id: Uuid,

    /// Coin amount to send.
    pub amount: i64,
}

/// Request to cash out coins to the saved payout destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashoutRequest {
    /// Gross coin amount to withdraw. Fees are deducted from this.
    pub amount: i64,
}

/// Operator decision on a pending cashout.
///
/// ## Example JSON
///
/// ```json
/// { "status": "failed" }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveCashoutRequest {
    /// Terminal decision: "completed" or "failed".
    pub status: String,
}

/// Request to save the account's payout destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankAccountRequest {
    /// Account holder name.
    pub account_name: String,

    /// Saudi IBAN ("SA" + 22 digits).
    pub iban: String,

    /// Bank name.
    pub bank_name: String,
}

/// Query parameters for transaction history.
///
/// ## Example URL
///
/// ```text
/// GET /coins/history?page=2&limit=20
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    /// 1-based page number. Default: 1
    #[serde(default = "default_page")]
    pub page: i64,

    /// Page size. Default: 20, capped at 100.
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    20
}

/// Query parameters for the operator cashout list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashoutListQuery {
    /// Filter status. Default: "pending".
    pub status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_query_defaults() {
        let query: HistoryQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(query.page, 1);
        assert_eq!(query.limit, 20);
    }

    #[test]
    fn test_send_request_camel_case() {
        let body = r#"{"projectId":"550e8400-e29b-41d4-a716-446655440000","amount":50}"#;
        let req: SendCoinsRequest = serde_json::from_str(body).unwrap();
        assert_eq!(req.amount, 50);
    }
}
