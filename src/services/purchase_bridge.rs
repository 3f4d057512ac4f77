//! # Purchase Bridge
//!
//! Reconciles external payment outcomes with the ledger. A purchase is
//! initiated by the buy flow as a `pending` transaction keyed by its
//! checkout session id; this service flips it to `completed` and
//! credits the buyer when the processor confirms payment.
//!
//! ## Two triggers, one settlement
//!
//! Settlement can arrive twice for the same session:
//!
//! - the processor's webhook (`checkout.session.completed`)
//! - the client confirmation call after the checkout redirect
//!
//! Both funnel into [`PurchaseBridge::settle_session`], whose
//! conditional `pending -> completed` update fires at most once per
//! session. Whichever trigger loses the race observes `None` and
//! credits nothing, so replays and races are harmless.
//!
//! The credited amount always comes from the stored transaction row,
//! never from webhook metadata.

use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::{queries, Database, DatabaseError, TransactionRecord};
use crate::models::ConfirmResponse;
use crate::payments::{self, CheckoutSession, SignatureError, StripeClient, WebhookEvent};
use crate::services::ledger::LedgerError;

/// Errors specific to webhook ingestion. These map to a 400 response;
/// the processor retries on anything but 2xx, so a signature failure
/// must not be acknowledged.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Signature verification failed.
    #[error("Webhook signature verification failed: {0}")]
    Signature(#[from] SignatureError),

    /// The payload was not a valid event envelope.
    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),

    /// Database failure while settling.
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Outcome of processing one webhook delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// A pending purchase was settled and the buyer credited.
    Settled,
    /// The session was already settled by an earlier delivery or by the
    /// client confirmation path.
    AlreadySettled,
    /// The event was valid but not one we act on.
    Ignored,
}

/// Bridges processor notifications into ledger credits.
#[derive(Clone)]
pub struct PurchaseBridge {
    /// Database connection for settlement.
    db: Database,

    /// Processor client, used by the client confirmation path to
    /// re-fetch the session server side.
    payments: Option<StripeClient>,

    /// Webhook signing secret. `None` disables verification, which is
    /// only acceptable in local development.
    webhook_secret: Option<String>,

    /// Accepted clock skew for webhook timestamps, in seconds.
    tolerance_secs: i64,
}

impl PurchaseBridge {
    pub fn new(
        db: Database,
        payments: Option<StripeClient>,
        webhook_secret: Option<String>,
        tolerance_secs: i64,
    ) -> Self {
        Self {
            db,
            payments,
            webhook_secret,
            tolerance_secs,
        }
    }

    // ==========================================
    // WEBHOOK PATH
    // ==========================================

    /// Process one webhook delivery.
    ///
    /// Verifies the signature over the raw payload, then settles the
    /// session if the event is a completed coin-purchase checkout. Any
    /// other valid event is acknowledged and ignored.
    pub async fn handle_webhook(
        &self,
        payload: &[u8],
        signature_header: Option<&str>,
    ) -> Result<WebhookOutcome, WebhookError> {
        match (&self.webhook_secret, signature_header) {
            (Some(secret), Some(header)) => {
                let now = chrono::Utc::now().timestamp();
                payments::verify_webhook_signature(
                    payload,
                    header,
                    secret,
                    self.tolerance_secs,
                    now,
                )?;
            }
            (Some(_), None) => return Err(SignatureError::MissingSignature.into()),
            (None, _) => {
                warn!("Webhook secret not configured, accepting unverified delivery");
            }
        }

        let event: WebhookEvent = serde_json::from_slice(payload)
            .map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;

        let session = match event.completed_session() {
            Some(session) if session.metadata.is_coin_purchase() => session,
            _ => return Ok(WebhookOutcome::Ignored),
        };

        match self.settle_session(&session).await? {
            Some((tx, balance)) => {
                info!(
                    "Webhook settled purchase {} ({} coins, balance now {})",
                    tx.id, tx.amount, balance
                );
                Ok(WebhookOutcome::Settled)
            }
            None => Ok(WebhookOutcome::AlreadySettled),
        }
    }

    // ==========================================
    // CLIENT CONFIRMATION PATH
    // ==========================================

    /// Confirm a purchase on behalf of the redirected client.
    ///
    /// The session is re-fetched from the processor server side; the
    /// client's claim is never trusted. It must be paid and belong to
    /// the calling account. If the webhook already settled it, this
    /// reports success with the current balance and credits nothing.
    pub async fn confirm_purchase(
        &self,
        account_id: Uuid,
        session_id: &str,
    ) -> Result<ConfirmResponse, LedgerError> {
        let payments = self
            .payments
            .as_ref()
            .ok_or(LedgerError::PaymentServiceUnavailable)?;

        let session = payments.retrieve_checkout_session(session_id).await?;

        if !session.is_paid() {
            return Err(LedgerError::ExternalVerificationFailed(
                "payment not completed".to_string(),
            ));
        }
        if session.metadata.account() != Some(account_id) {
            return Err(LedgerError::ExternalVerificationFailed(
                "session does not belong to this account".to_string(),
            ));
        }

        match self.settle_session(&session).await? {
            Some((tx, balance)) => {
                info!(
                    "Confirmation settled purchase {} ({} coins)",
                    tx.id, tx.amount
                );
                Ok(ConfirmResponse {
                    balance,
                    message: format!("{} coins added to your balance", tx.amount),
                })
            }
            None => {
                // Already settled; report the live balance.
                let balance = queries::get_account_balance(self.db.pool(), account_id)
                    .await?
                    .ok_or(LedgerError::NotFound("Account"))?;
                Ok(ConfirmResponse {
                    balance,
                    message: "Purchase already confirmed".to_string(),
                })
            }
        }
    }

    // ==========================================
    // SETTLEMENT
    // ==========================================

    /// Settle a paid session: flip its pending transaction to completed
    /// and credit the buyer, atomically.
    ///
    /// Returns `None` when the session has no pending transaction left,
    /// which means it was settled before (or never initiated here). The
    /// amount credited is the stored row's amount.
    async fn settle_session(
        &self,
        session: &CheckoutSession,
    ) -> Result<Option<(TransactionRecord, i64)>, DatabaseError> {
        let mut client = self
            .db
            .pool()
            .get()
            .await
            .map_err(|e| DatabaseError::ConnectionError(e.to_string()))?;
        let txn = client.transaction().await?;

        let record =
            match queries::complete_purchase_by_session(
                &txn,
                &session.id,
                session.payment_intent.as_deref(),
            )
            .await?
            {
                Some(record) => record,
                None => return Ok(None),
            };

        let balance = queries::credit_purchase(&txn, record.from_account, record.amount)
            .await?
            .ok_or_else(|| {
                DatabaseError::NotFound(format!("Account not found: {}", record.from_account))
            })?;

        txn.commit().await?;

        Ok(Some((record, balance)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_outcome_equality() {
        assert_eq!(WebhookOutcome::Settled, WebhookOutcome::Settled);
        assert_ne!(WebhookOutcome::Settled, WebhookOutcome::AlreadySettled);
    }

    #[test]
    fn test_signature_error_converts() {
        let err: WebhookError = SignatureError::Mismatch.into();
        assert!(matches!(err, WebhookError::Signature(SignatureError::Mismatch)));
    }
}
