//! # Payment Processor Client
//!
//! Thin client for the Stripe-style checkout API plus webhook signature
//! verification. The ledger only needs three calls:
//!
//! - create a checkout session (buy flow)
//! - retrieve a session (client confirmation path)
//! - verify a webhook signature (server notification path)
//!
//! All HTTP calls carry a bounded timeout and surface as a typed
//! [`PaymentError`] rather than hanging the request.

use std::collections::HashMap;
use std::time::Duration;

use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Outbound request timeout for processor calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Coin price in the processor's smallest currency unit.
/// 1 coin = 1 SAR, and 1 SAR = 100 halalas.
const HALALAS_PER_COIN: i64 = 100;

/// Errors from the payment processor boundary.
#[derive(Error, Debug)]
pub enum PaymentError {
    /// Network-level failure (timeout, DNS, connection reset).
    #[error("Payment request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The processor returned a non-success status.
    #[error("Payment API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The processor's response was missing an expected field.
    #[error("Invalid payment response: {0}")]
    InvalidResponse(String),
}

/// Webhook signature verification failures.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SignatureError {
    #[error("Signature header missing timestamp")]
    MissingTimestamp,

    #[error("Signature header missing signature")]
    MissingSignature,

    #[error("Malformed signature header")]
    Malformed,

    #[error("Signature timestamp outside tolerance (age {0}s)")]
    Expired(i64),

    #[error("Signature mismatch")]
    Mismatch,
}

/// Metadata we attach to every checkout session so the webhook can be
/// routed back to the originating account.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SessionMetadata {
    /// The buying account's id.
    #[serde(rename = "accountId")]
    pub account_id: Option<String>,

    /// Coin amount as a string (processor metadata is string-valued).
    #[serde(rename = "coinAmount")]
    pub coin_amount: Option<String>,

    /// Always "coin_purchase" for sessions we created. Other sessions
    /// on the same processor account are ignored.
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

impl SessionMetadata {
    /// Whether this session was created by the coin purchase flow.
    pub fn is_coin_purchase(&self) -> bool {
        self.kind.as_deref() == Some("coin_purchase")
    }

    /// Parse the buying account id.
    pub fn account(&self) -> Option<Uuid> {
        self.account_id.as_deref().and_then(|s| Uuid::parse_str(s).ok())
    }

    /// Parse the coin amount.
    pub fn coins(&self) -> Option<i64> {
        self.coin_amount.as_deref().and_then(|s| s.parse().ok())
    }
}

/// A checkout session as reported by the processor.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    /// Session id ("cs_..."). Correlates to one pending transaction.
    pub id: String,

    /// Hosted checkout URL the client is redirected to.
    #[serde(default)]
    pub url: Option<String>,

    /// "paid", "unpaid" or "no_payment_required".
    #[serde(default)]
    pub payment_status: Option<String>,

    /// Payment reference ("pi_..."), present once payment is made.
    #[serde(default)]
    pub payment_intent: Option<String>,

    /// Metadata we attached at creation.
    #[serde(default)]
    pub metadata: SessionMetadata,
}

impl CheckoutSession {
    /// Whether the processor reports this session as paid.
    pub fn is_paid(&self) -> bool {
        self.payment_status.as_deref() == Some("paid")
    }
}

/// A webhook event envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    /// Event type, e.g. "checkout.session.completed".
    #[serde(rename = "type")]
    pub event_type: String,

    /// Event payload.
    pub data: WebhookData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookData {
    /// The object the event describes. For checkout events this is a
    /// [`CheckoutSession`].
    pub object: serde_json::Value,
}

impl WebhookEvent {
    /// Extract the checkout session for a `checkout.session.completed`
    /// event. Returns `None` for any other event type.
    pub fn completed_session(&self) -> Option<CheckoutSession> {
        if self.event_type != "checkout.session.completed" {
            return None;
        }
        serde_json::from_value(self.data.object.clone()).ok()
    }
}

/// Error body shape returned by the processor.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

/// Checkout API client.
///
/// Constructed once from config and cloned into services; `reqwest`'s
/// `Client` is internally pooled.
#[derive(Clone)]
pub struct StripeClient {
    http: Client,
    secret_key: String,
    api_base: String,
}

impl StripeClient {
    /// Create a client with the configured secret key and API base.
    pub fn new(secret_key: &str, api_base: &str) -> Result<Self, PaymentError> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            secret_key: secret_key.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    /// Create a checkout session for a coin purchase.
    ///
    /// Prices the session at 1 coin = 1 SAR and tags it with metadata
    /// (`accountId`, `coinAmount`, `type=coin_purchase`) so that both
    /// reconciliation triggers can route it back to the right account.
    pub async fn create_checkout_session(
        &self,
        account_id: Uuid,
        email: &str,
        coin_amount: i64,
        client_url: &str,
    ) -> Result<CheckoutSession, PaymentError> {
        debug!("Creating checkout session for {} ({} coins)", account_id, coin_amount);

        let unit_amount = coin_amount * HALALAS_PER_COIN;
        let product_name = format!("{} Coins", coin_amount);
        let product_description = format!(
            "Purchase {} coins for your wallet. 1 coin = 1 SAR. No refunds.",
            coin_amount
        );
        let success_url = format!(
            "{}/coins.html?purchase=success&session_id={{CHECKOUT_SESSION_ID}}",
            client_url
        );
        let cancel_url = format!("{}/coins.html?purchase=cancelled", client_url);

        let params: Vec<(&str, String)> = vec![
            ("mode", "payment".to_string()),
            ("payment_method_types[0]", "card".to_string()),
            ("line_items[0][quantity]", "1".to_string()),
            ("line_items[0][price_data][currency]", "sar".to_string()),
            ("line_items[0][price_data][unit_amount]", unit_amount.to_string()),
            ("line_items[0][price_data][product_data][name]", product_name),
            (
                "line_items[0][price_data][product_data][description]",
                product_description,
            ),
            ("success_url", success_url),
            ("cancel_url", cancel_url),
            ("customer_email", email.to_string()),
            ("metadata[accountId]", account_id.to_string()),
            ("metadata[coinAmount]", coin_amount.to_string()),
            ("metadata[type]", "coin_purchase".to_string()),
        ];

        let response = self
            .http
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&params)
            .send()
            .await?;

        Self::parse_session(response).await
    }

    /// Retrieve a checkout session by id.
    ///
    /// Used by the client confirmation path to independently verify
    /// that the session is paid and belongs to the caller.
    pub async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSession, PaymentError> {
        debug!("Retrieving checkout session: {}", session_id);

        let response = self
            .http
            .get(format!("{}/v1/checkout/sessions/{}", self.api_base, session_id))
            .basic_auth(&self.secret_key, None::<&str>)
            .send()
            .await?;

        Self::parse_session(response).await
    }

    async fn parse_session(response: reqwest::Response) -> Result<CheckoutSession, PaymentError> {
        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ApiErrorBody>()
                .await
                .ok()
                .and_then(|b| b.error)
                .and_then(|e| e.message)
                .unwrap_or_else(|| "unknown error".to_string());
            return Err(PaymentError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<CheckoutSession>()
            .await
            .map_err(|e| PaymentError::InvalidResponse(e.to_string()))
    }
}

/// Verify a webhook signature header against the raw payload.
///
/// The header carries a timestamp and one or more HMAC-SHA256
/// signatures over `"{timestamp}.{payload}"`:
///
/// ```text
/// t=1700000000,v1=5257a869e7...
/// ```
///
/// `now` is passed in (rather than read from the clock) so the
/// tolerance window is testable. Verification uses the Mac's own
/// constant-time comparison.
pub fn verify_webhook_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: i64,
    now: i64,
) -> Result<(), SignatureError> {
    let mut timestamp: Option<i64> = None;
    let mut signatures: Vec<Vec<u8>> = Vec::new();

    for part in header.split(',') {
        let (key, value) = part.trim().split_once('=').ok_or(SignatureError::Malformed)?;
        match key {
            "t" => {
                timestamp = Some(value.parse().map_err(|_| SignatureError::Malformed)?);
            }
            "v1" => {
                signatures.push(hex::decode(value).map_err(|_| SignatureError::Malformed)?);
            }
            // Unknown schemes (v0 etc.) are ignored.
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::MissingTimestamp)?;
    if signatures.is_empty() {
        return Err(SignatureError::MissingSignature);
    }

    let age = (now - timestamp).abs();
    if age > tolerance_secs {
        return Err(SignatureError::Expired(age));
    }

    for signature in &signatures {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| SignatureError::Malformed)?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        if mac.verify_slice(signature).is_ok() {
            return Ok(());
        }
    }

    Err(SignatureError::Mismatch)
}

/// Build a signature header for a payload. Test helper; also handy for
/// local webhook replay tooling.
#[allow(dead_code)]
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    let signature = hex::encode(mac.finalize().into_bytes());
    format!("t={},v1={}", timestamp, signature)
}

/// Parse the raw metadata map form used in tests and fixtures.
#[allow(dead_code)]
pub fn metadata_from_map(map: &HashMap<String, String>) -> SessionMetadata {
    SessionMetadata {
        account_id: map.get("accountId").cloned(),
        coin_amount: map.get("coinAmount").cloned(),
        kind: map.get("type").cloned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";

    #[test]
    fn test_valid_signature() {
        let payload = br#"{"type":"checkout.session.completed"}"#;
        let header = sign_payload(payload, SECRET, 1_700_000_000);

        assert_eq!(
            verify_webhook_signature(payload, &header, SECRET, 300, 1_700_000_010),
            Ok(())
        );
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let payload = br#"{"amount":100}"#;
        let header = sign_payload(payload, SECRET, 1_700_000_000);

        let result = verify_webhook_signature(
            br#"{"amount":100000}"#,
            &header,
            SECRET,
            300,
            1_700_000_010,
        );
        assert_eq!(result, Err(SignatureError::Mismatch));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let payload = b"payload";
        let header = sign_payload(payload, SECRET, 1_700_000_000);

        let result = verify_webhook_signature(payload, &header, "whsec_other", 300, 1_700_000_010);
        assert_eq!(result, Err(SignatureError::Mismatch));
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let payload = b"payload";
        let header = sign_payload(payload, SECRET, 1_700_000_000);

        let result = verify_webhook_signature(payload, &header, SECRET, 300, 1_700_009_999);
        assert!(matches!(result, Err(SignatureError::Expired(_))));
    }

    #[test]
    fn test_malformed_header_rejected() {
        let payload = b"payload";
        assert_eq!(
            verify_webhook_signature(payload, "not-a-header", SECRET, 300, 0),
            Err(SignatureError::Malformed)
        );
        assert_eq!(
            verify_webhook_signature(payload, "v1=00ff", SECRET, 300, 0),
            Err(SignatureError::MissingTimestamp)
        );
        assert_eq!(
            verify_webhook_signature(payload, "t=100", SECRET, 300, 100),
            Err(SignatureError::MissingSignature)
        );
    }

    #[test]
    fn test_completed_session_extraction() {
        let event: WebhookEvent = serde_json::from_str(
            r#"{
                "type": "checkout.session.completed",
                "data": {
                    "object": {
                        "id": "cs_test_123",
                        "payment_status": "paid",
                        "payment_intent": "pi_test_456",
                        "metadata": {
                            "accountId": "550e8400-e29b-41d4-a716-446655440000",
                            "coinAmount": "200",
                            "type": "coin_purchase"
                        }
                    }
                }
            }"#,
        )
        .unwrap();

        let session = event.completed_session().unwrap();
        assert_eq!(session.id, "cs_test_123");
        assert!(session.is_paid());
        assert!(session.metadata.is_coin_purchase());
        assert_eq!(session.metadata.coins(), Some(200));
        assert_eq!(
            session.metadata.account().unwrap().to_string(),
            "550e8400-e29b-41d4-a716-446655440000"
        );
    }

    #[test]
    fn test_other_events_ignored() {
        let event: WebhookEvent = serde_json::from_str(
            r#"{"type": "payment_intent.created", "data": {"object": {"id": "pi_1"}}}"#,
        )
        .unwrap();
        assert!(event.completed_session().is_none());
    }
}
