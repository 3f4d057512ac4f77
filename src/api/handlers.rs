//! # API Request Handlers
//!
//! This module contains the handler functions for each API endpoint.
//! Each handler:
//! 1. Extracts the caller's account id from the `X-Account-Id` header
//! 2. Parses and validates the request body
//! 3. Calls the appropriate service
//! 4. Returns a formatted response
//!
//! Authentication itself lives in the account directory in front of
//! this service; by the time a request arrives here the gateway has
//! already verified the session and stamped the header.
//!
//! ## Error Handling
//!
//! All errors are caught and returned as JSON:
//!
//! ```json
//! {
//!     "success": false,
//!     "error": {
//!         "code": "INSUFFICIENT_BALANCE",
//!         "message": "Insufficient balance"
//!     }
//! }
//! ```

use std::sync::Arc;

use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::{
    ApiResponse, BankAccountRequest, BankAccountResponse, BuyCoinsRequest, CashoutListQuery,
    CashoutRequest, CashoutRequestResponse, ConfirmPurchaseRequest, HealthResponse,
    HistoryQuery, HistoryResponse, Pagination, ResolveCashoutRequest, ResolvedCashoutResponse,
    SendCoinsRequest, StatsResponse, TransactionResponse,
};
use crate::db::TransactionStatus;
use crate::services::{CashoutDecision, LedgerError, WebhookError};
use crate::AppState;

/// Extract the caller's account id from the `X-Account-Id` header.
fn caller_id(req: &HttpRequest) -> Result<Uuid, HttpResponse> {
    req.headers()
        .get("X-Account-Id")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| {
            HttpResponse::Unauthorized().json(ApiResponse::<()>::error(
                "UNAUTHORIZED",
                "Missing or invalid X-Account-Id header",
            ))
        })
}

/// Map a ledger error to an HTTP response with the envelope.
fn error_response(err: &LedgerError) -> HttpResponse {
    let status = match err {
        LedgerError::InvalidAmount(_)
        | LedgerError::InvalidInput(_)
        | LedgerError::InsufficientBalance
        | LedgerError::ProjectNotActive
        | LedgerError::SelfFundingNotAllowed
        | LedgerError::PayoutDestinationMissing
        | LedgerError::ExternalVerificationFailed(_) => StatusCode::BAD_REQUEST,
        LedgerError::AlreadyProcessed => StatusCode::CONFLICT,
        LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
        LedgerError::Unauthorized => StatusCode::FORBIDDEN,
        LedgerError::PaymentServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        LedgerError::Payment(_) => StatusCode::BAD_GATEWAY,
        LedgerError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        error!("Request failed: {}", err);
    }

    HttpResponse::build(status).json(ApiResponse::<()>::error(err.code(), &err.to_string()))
}

/// API information endpoint (root).
///
/// ## Endpoint
///
/// `GET /`
pub async fn api_info() -> HttpResponse {
    let info = json!({
        "name": "Coin Ledger API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Coin ledger and transaction engine",
        "endpoints": {
            "health": { "method": "GET", "path": "/health" },
            "coins": {
                "balance": { "method": "GET", "path": "/coins/balance" },
                "buy": { "method": "POST", "path": "/coins/buy" },
                "webhook": { "method": "POST", "path": "/coins/webhook" },
                "confirmPurchase": { "method": "POST", "path": "/coins/confirm-purchase" },
                "send": { "method": "POST", "path": "/coins/send" },
                "cashout": { "method": "POST", "path": "/coins/cashout" },
                "history": { "method": "GET", "path": "/coins/history" },
                "bankAccount": { "method": "PUT", "path": "/coins/bank-account" }
            },
            "admin": {
                "cashouts": { "method": "GET", "path": "/admin/cashouts" },
                "resolveCashout": { "method": "PUT", "path": "/admin/cashouts/{id}" },
                "stats": { "method": "GET", "path": "/admin/stats" }
            }
        }
    });

    HttpResponse::Ok().json(ApiResponse::success(info))
}

/// Health check endpoint.
///
/// ## Endpoint
///
/// `GET /health`
///
/// ## Example
///
/// ```bash
/// curl http://127.0.0.1:8080/health
/// ```
pub async fn health_check(state: web::Data<Arc<AppState>>) -> HttpResponse {
    let db_healthy = state.db.pool().get().await.is_ok();

    let response = HealthResponse {
        status: if db_healthy { "healthy" } else { "unhealthy" }.to_string(),
        database: db_healthy,
        payments_configured: state.payments_configured,
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
    };

    let status_code = if db_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    HttpResponse::build(status_code).json(ApiResponse::success(response))
}

/// Get the caller's coin balance.
///
/// ## Endpoint
///
/// `GET /coins/balance`
pub async fn get_balance(req: HttpRequest, state: web::Data<Arc<AppState>>) -> HttpResponse {
    let account_id = match caller_id(&req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match state.ledger.get_balance(account_id).await {
        Ok(balance) => HttpResponse::Ok().json(ApiResponse::success(balance)),
        Err(e) => error_response(&e),
    }
}

/// Start a coin purchase.
///
/// Creates a checkout session and records the pending purchase. The
/// balance is not credited until the payment is confirmed.
///
/// ## Endpoint
///
/// `POST /coins/buy`
///
/// ## Example
///
/// ```bash
/// curl -X POST http://127.0.0.1:8080/coins/buy \
///   -H "Content-Type: application/json" \
///   -H "X-Account-Id: 550e8400-e29b-41d4-a716-446655440000" \
///   -d '{ "amount": 200 }'
/// ```
pub async fn buy_coins(
    req: HttpRequest,
    state: web::Data<Arc<AppState>>,
    body: web::Json<BuyCoinsRequest>,
) -> HttpResponse {
    let account_id = match caller_id(&req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    info!("Buy request: {} coins for {}", body.amount, account_id);

    match state.ledger.buy_coins(account_id, body.amount).await {
        Ok(checkout) => HttpResponse::Ok().json(ApiResponse::success(checkout)),
        Err(e) => error_response(&e),
    }
}

/// Payment processor webhook.
///
/// The body must be read raw; the signature covers the exact bytes.
/// A signature failure is a 400 so the processor retries; everything
/// else is acknowledged with a 200 even when nothing was settled.
///
/// ## Endpoint
///
/// `POST /coins/webhook`
pub async fn webhook(
    req: HttpRequest,
    state: web::Data<Arc<AppState>>,
    payload: web::Bytes,
) -> HttpResponse {
    let signature = req
        .headers()
        .get("Stripe-Signature")
        .and_then(|v| v.to_str().ok());

    match state.bridge.handle_webhook(&payload, signature).await {
        Ok(outcome) => HttpResponse::Ok().json(ApiResponse::success(json!({
            "received": true,
            "outcome": format!("{:?}", outcome),
        }))),
        Err(WebhookError::Database(e)) => {
            error!("Webhook settlement failed: {}", e);
            HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("DATABASE_ERROR", &e.to_string()))
        }
        Err(e) => {
            warn!("Webhook rejected: {}", e);
            HttpResponse::BadRequest()
                .json(ApiResponse::<()>::error("WEBHOOK_REJECTED", &e.to_string()))
        }
    }
}

/// Confirm a purchase after the checkout redirect.
///
/// Safe to call even if the webhook already settled the session; the
/// second settlement attempt is a no-op.
///
/// ## Endpoint
///
/// `POST /coins/confirm-purchase`
pub async fn confirm_purchase(
    req: HttpRequest,
    state: web::Data<Arc<AppState>>,
    body: web::Json<ConfirmPurchaseRequest>,
) -> HttpResponse {
    let account_id = match caller_id(&req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match state
        .bridge
        .confirm_purchase(account_id, &body.session_id)
        .await
    {
        Ok(result) => HttpResponse::Ok().json(ApiResponse::success(result)),
        Err(e) => error_response(&e),
    }
}

/// Send coins to a project.
///
/// ## Endpoint
///
/// `POST /coins/send`
///
/// ## Example
///
/// ```bash
/// curl -X POST http://127.0.0.1:8080/coins/send \
///   -H "Content-Type: application/json" \
///   -H "X-Account-Id: 550e8400-e29b-41d4-a716-446655440000" \
///   -d '{ "projectId": "...", "amount": 50 }'
/// ```
pub async fn send_coins(
    req: HttpRequest,
    state: web::Data<Arc<AppState>>,
    body: web::Json<SendCoinsRequest>,
) -> HttpResponse {
    let account_id = match caller_id(&req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    info!(
        "Send request: {} coins from {} to project {}",
        body.amount, account_id, body.project_id
    );

    match state
        .ledger
        .send_to_project(account_id, body.project_id, body.amount)
        .await
    {
        Ok(result) => HttpResponse::Ok().json(ApiResponse::success(result)),
        Err(e) => error_response(&e),
    }
}

/// Request a cashout.
///
/// ## Endpoint
///
/// `POST /coins/cashout`
pub async fn cashout(
    req: HttpRequest,
    state: web::Data<Arc<AppState>>,
    body: web::Json<CashoutRequest>,
) -> HttpResponse {
    let account_id = match caller_id(&req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    info!("Cashout request: {} coins from {}", body.amount, account_id);

    match state.ledger.request_cashout(account_id, body.amount).await {
        Ok(result) => HttpResponse::Ok().json(ApiResponse::success(result)),
        Err(e) => error_response(&e),
    }
}

/// Get the caller's transaction history.
///
/// ## Endpoint
///
/// `GET /coins/history?page=1&limit=20`
pub async fn get_history(
    req: HttpRequest,
    state: web::Data<Arc<AppState>>,
    query: web::Query<HistoryQuery>,
) -> HttpResponse {
    let account_id = match caller_id(&req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let page = query.page.max(1);
    let limit = query.limit.clamp(1, 100);

    match state.ledger.history(account_id, page, limit).await {
        Ok((rows, total)) => {
            let response = HistoryResponse {
                data: rows.into_iter().map(TransactionResponse::from).collect(),
                pagination: Pagination {
                    page,
                    limit,
                    total,
                    pages: (total + limit - 1) / limit,
                },
            };
            HttpResponse::Ok().json(ApiResponse::success(response))
        }
        Err(e) => error_response(&e),
    }
}

/// Save the caller's payout destination.
///
/// ## Endpoint
///
/// `PUT /coins/bank-account`
pub async fn update_bank_account(
    req: HttpRequest,
    state: web::Data<Arc<AppState>>,
    body: web::Json<BankAccountRequest>,
) -> HttpResponse {
    let account_id = match caller_id(&req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match state
        .ledger
        .update_payout_destination(account_id, &body.account_name, &body.iban, &body.bank_name)
        .await
    {
        Ok(iban) => HttpResponse::Ok().json(ApiResponse::success(BankAccountResponse {
            account_name: body.account_name.trim().to_string(),
            iban,
            bank_name: body.bank_name.trim().to_string(),
        })),
        Err(e) => error_response(&e),
    }
}

/// List cashout requests (operator only).
///
/// ## Endpoint
///
/// `GET /admin/cashouts?status=pending`
pub async fn list_cashouts(
    req: HttpRequest,
    state: web::Data<Arc<AppState>>,
    query: web::Query<CashoutListQuery>,
) -> HttpResponse {
    let operator_id = match caller_id(&req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let status = match query.status.as_deref() {
        None => TransactionStatus::Pending,
        Some(s) => match TransactionStatus::parse(s) {
            Some(status) => status,
            None => {
                return HttpResponse::BadRequest().json(ApiResponse::<()>::error(
                    "INVALID_INPUT",
                    "status must be pending, completed or failed",
                ))
            }
        },
    };

    match state.ledger.list_cashouts(operator_id, status).await {
        Ok(rows) => {
            let list: Vec<CashoutRequestResponse> =
                rows.into_iter().map(CashoutRequestResponse::from).collect();
            HttpResponse::Ok().json(ApiResponse::success(list))
        }
        Err(e) => error_response(&e),
    }
}

/// Resolve a pending cashout (operator only).
///
/// ## Endpoint
///
/// `PUT /admin/cashouts/{id}`
///
/// ## Example
///
/// ```bash
/// curl -X PUT http://127.0.0.1:8080/admin/cashouts/550e8400-... \
///   -H "Content-Type: application/json" \
///   -H "X-Account-Id: <operator id>" \
///   -d '{ "status": "failed" }'
/// ```
pub async fn resolve_cashout(
    req: HttpRequest,
    state: web::Data<Arc<AppState>>,
    path: web::Path<Uuid>,
    body: web::Json<ResolveCashoutRequest>,
) -> HttpResponse {
    let operator_id = match caller_id(&req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let decision = match CashoutDecision::parse(&body.status) {
        Some(decision) => decision,
        None => {
            return HttpResponse::BadRequest().json(ApiResponse::<()>::error(
                "INVALID_INPUT",
                "status must be \"completed\" or \"failed\"",
            ))
        }
    };

    match state
        .ledger
        .resolve_cashout(operator_id, path.into_inner(), decision)
        .await
    {
        Ok(tx) => HttpResponse::Ok().json(ApiResponse::success(ResolvedCashoutResponse {
            id: tx.id,
            status: tx.status,
            amount: tx.amount,
            net_amount: tx.net_amount,
        })),
        Err(e) => error_response(&e),
    }
}

/// Platform statistics (operator only).
///
/// ## Endpoint
///
/// `GET /admin/stats`
pub async fn get_stats(req: HttpRequest, state: web::Data<Arc<AppState>>) -> HttpResponse {
    let operator_id = match caller_id(&req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match state.ledger.platform_stats(operator_id).await {
        Ok(stats) => {
            HttpResponse::Ok().json(ApiResponse::success(StatsResponse::from_stats(stats, Utc::now())))
        }
        Err(e) => error_response(&e),
    }
}
