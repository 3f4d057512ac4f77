//! # Ledger Auditor
//!
//! Background task that periodically re-derives every account's balance
//! from the transaction log and compares it to the live balance. The
//! ledger is designed so the two can never diverge; if they do, that is
//! a bug or operator tampering, and the auditor's job is to make it
//! loud and durable, not to fix it.
//!
//! Each nonzero difference is written to `reconciliation_logs` and
//! logged at error level.

use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::db::{Database, DatabaseError, ReconciliationLog};
use crate::db::queries;

/// Periodic balance reconciliation task.
pub struct LedgerAuditor {
    db: Database,
    interval: Duration,
}

impl LedgerAuditor {
    pub fn new(db: Database, interval_secs: u64) -> Self {
        Self {
            db,
            interval: Duration::from_secs(interval_secs),
        }
    }

    /// Run the audit loop forever. Spawned once at startup.
    pub async fn start(self) {
        info!(
            "Ledger auditor started (interval: {}s)",
            self.interval.as_secs()
        );

        let mut ticker = tokio::time::interval(self.interval);
        // The first tick fires immediately; skip it so startup isn't
        // serialized behind a full table scan.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match self.run_once().await {
                Ok(0) => debug!("Audit pass clean"),
                Ok(drifted) => error!("Audit pass found {} drifted account(s)", drifted),
                Err(e) => error!("Audit pass failed: {}", e),
            }
        }
    }

    /// One audit pass. Returns the number of drifted accounts.
    pub async fn run_once(&self) -> Result<usize, DatabaseError> {
        let rows = queries::audit_balances(self.db.pool()).await?;
        let mut drifted = 0;

        for (account_id, actual, expected) in rows {
            let difference = actual - expected;
            if difference == 0 {
                continue;
            }

            drifted += 1;
            error!(
                "Balance drift: account={} actual={} expected={} difference={}",
                account_id, actual, expected, difference
            );

            let log = ReconciliationLog {
                id: Uuid::new_v4(),
                account_id: Some(account_id),
                expected_balance: expected,
                actual_balance: actual,
                difference,
                notes: Some("automatic audit pass".to_string()),
                created_at: Utc::now(),
            };
            queries::insert_reconciliation_log(self.db.pool(), &log).await?;
        }

        Ok(drifted)
    }
}
