//! # API Route Configuration
//!
//! This module sets up all the HTTP routes for the API.

use actix_web::web;

use super::handlers;

/// Configure all API routes.
///
/// This function is called from main.rs to set up
/// all the endpoint routes.
///
/// ## Route Structure
///
/// ```text
/// /
/// ├── /health                  GET - Health check
/// ├── /coins
/// │   ├── /balance             GET - Coin balance
/// │   ├── /buy                 POST - Start a purchase
/// │   ├── /webhook             POST - Payment processor webhook
/// │   ├── /confirm-purchase    POST - Client confirmation
/// │   ├── /send                POST - Send coins to a project
/// │   ├── /cashout             POST - Request a cashout
/// │   ├── /history             GET - Transaction history
/// │   └── /bank-account        PUT - Save payout destination
/// └── /admin
///     ├── /cashouts            GET - List cashout requests
///     ├── /cashouts/{id}       PUT - Resolve a cashout
///     └── /stats               GET - Platform statistics
/// ```
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg
        // Root endpoint - API information
        .route("/", web::get().to(handlers::api_info))
        // Health check endpoint
        .route("/health", web::get().to(handlers::health_check))
        // Coin endpoints
        .service(
            web::scope("/coins")
                .route("/balance", web::get().to(handlers::get_balance))
                .route("/buy", web::post().to(handlers::buy_coins))
                // Webhook takes the raw body; the signature covers the bytes
                .route("/webhook", web::post().to(handlers::webhook))
                .route("/confirm-purchase", web::post().to(handlers::confirm_purchase))
                .route("/send", web::post().to(handlers::send_coins))
                .route("/cashout", web::post().to(handlers::cashout))
                .route("/history", web::get().to(handlers::get_history))
                .route("/bank-account", web::put().to(handlers::update_bank_account)),
        )
        // Operator endpoints (role checked in the service layer)
        .service(
            web::scope("/admin")
                .route("/cashouts", web::get().to(handlers::list_cashouts))
                .route("/cashouts/{id}", web::put().to(handlers::resolve_cashout))
                .route("/stats", web::get().to(handlers::get_stats)),
        );
}
