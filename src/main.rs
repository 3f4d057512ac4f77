//! # Coin Ledger Backend Service
//!
//! This is the main entry point for the backend service that manages
//! the crowdfunding platform's coin economy. It provides:
//!
//! - REST API for coin operations (buy, send, cashout, history)
//! - Payment processor integration (checkout + webhook reconciliation)
//! - Background balance auditing against the transaction log
//! - Database storage for accounts, projects and transactions
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       BACKEND SERVICE                         │
//! │                                                               │
//! │  ┌─────────────┐  ┌──────────────────┐  ┌─────────────────┐  │
//! │  │  REST API   │  │ Purchase Bridge  │  │ Ledger Auditor  │  │
//! │  │  (Actix)    │  │ webhook+confirm  │  │ periodic audit  │  │
//! │  │             │  │                  │  │                 │  │
//! │  │  /coins/*   │  │                  │  │                 │  │
//! │  │  /admin/*   │  │                  │  │                 │  │
//! │  └─────────────┘  └──────────────────┘  └─────────────────┘  │
//! │         │                  │                     │            │
//! │  ┌──────┴──────────────────┴─────────────────────┴─────────┐ │
//! │  │                    LedgerService                         │ │
//! │  └──────────────────────────────────────────────────────────┘ │
//! │         │                                  │                  │
//! │  ┌──────┴──────┐                   ┌──────┴───────┐          │
//! │  │  PostgreSQL │                   │   Payment    │          │
//! │  │  Database   │                   │   Processor  │          │
//! │  └─────────────┘                   └──────────────┘          │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! 1. Set up PostgreSQL and create the database
//! 2. Copy `.env.example` to `.env` and configure
//! 3. Start the server: `cargo run` (migrations run at startup)
//!
//! ## Environment Variables
//!
//! See `.env.example` for all required configuration.

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod db;
mod models;
mod payments;
mod services;
mod utils;

#[cfg(test)]
mod ledger_tests;

use config::AppConfig;
use db::Database;
use payments::StripeClient;
use services::{LedgerAuditor, LedgerService, PurchaseBridge};

/// Application state shared across all handlers.
pub struct AppState {
    /// Database connection pool for PostgreSQL
    pub db: Database,

    /// Transfer engine (buy, send, cashout, resolve)
    pub ledger: LedgerService,

    /// Payment reconciliation (webhook + client confirmation)
    pub bridge: PurchaseBridge,

    /// Whether a payment processor key is configured
    pub payments_configured: bool,
}

/// Main entry point for the backend service.
///
/// This function:
/// 1. Loads configuration from environment
/// 2. Initializes database connection and runs migrations
/// 3. Sets up the payment processor client
/// 4. Starts the background auditor
/// 5. Launches the HTTP server
#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // =========================================
    // STEP 1: Initialize Logging
    // =========================================
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("🚀 Starting Coin Ledger Backend Service");

    // =========================================
    // STEP 2: Load Configuration
    // =========================================
    dotenvy::dotenv().ok(); // It's okay if .env doesn't exist

    let config = AppConfig::from_env().expect("Failed to load configuration");

    info!("📋 Configuration loaded");
    info!("   Client URL: {}", config.client_url);
    info!("   Audit interval: {}s", config.audit_interval);

    // =========================================
    // STEP 3: Initialize Database
    // =========================================
    let db = Database::connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    info!("🗄️  Database connected");

    db.run_migrations().await.expect("Failed to run migrations");

    info!("📦 Database migrations complete");

    // =========================================
    // STEP 4: Initialize Payment Client
    // =========================================
    let payments = match &config.stripe_secret_key {
        Some(key) => Some(
            StripeClient::new(key, &config.stripe_api_base)
                .expect("Failed to create payment client"),
        ),
        None => {
            warn!("⚠️  STRIPE_SECRET_KEY not set, purchases are disabled");
            None
        }
    };
    let payments_configured = payments.is_some();

    // =========================================
    // STEP 5: Initialize Services
    // =========================================
    let ledger = LedgerService::new(db.clone(), payments.clone(), config.clone());

    let bridge = PurchaseBridge::new(
        db.clone(),
        payments.clone(),
        config.stripe_webhook_secret.clone(),
        config.webhook_tolerance,
    );

    info!("🔧 Services initialized");

    // =========================================
    // STEP 6: Create Application State
    // =========================================
    let app_state = Arc::new(AppState {
        db: db.clone(),
        ledger,
        bridge,
        payments_configured,
    });

    // =========================================
    // STEP 7: Start Background Auditor
    // =========================================
    let auditor = LedgerAuditor::new(db.clone(), config.audit_interval);
    tokio::spawn(async move {
        auditor.start().await;
    });

    info!("👁️  Ledger auditor started");

    // =========================================
    // STEP 8: Start HTTP Server
    // =========================================
    let server_host = config.server_host.clone();
    let server_port = config.server_port;
    let client_url = config.client_url.clone();

    info!("🌐 Starting HTTP server on {}:{}", server_host, server_port);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&client_url)
            .allow_any_method()
            .allow_any_header()
            .supports_credentials()
            .max_age(3600);

        App::new()
            // Attach shared application state
            .app_data(web::Data::new(app_state.clone()))
            // CORS for the web client
            .wrap(cors)
            // Add logging middleware
            .wrap(middleware::Logger::default())
            // Configure API routes
            .configure(api::configure_routes)
    })
    .bind(format!("{}:{}", server_host, server_port))?
    .run()
    .await
}
