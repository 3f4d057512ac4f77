//! # Services
//!
//! Business logic above the database layer:
//!
//! - [`ledger`]: the transfer engine (buy, send, cashout, resolve)
//! - [`purchase_bridge`]: payment reconciliation (webhook + confirm)
//! - [`auditor`]: periodic balance reconciliation

pub mod auditor;
pub mod ledger;
pub mod purchase_bridge;

pub use auditor::LedgerAuditor;
pub use ledger::{cashout_fees, CashoutDecision, LedgerError, LedgerService};
pub use purchase_bridge::{PurchaseBridge, WebhookError, WebhookOutcome};
