//! Stripe Webhook Handling
//!
//! Verifies the `stripe-signature` header over the raw request body, parses
//! the event envelope and dispatches on its type. Only
//! `checkout.session.completed` changes state.

use hmac::{Hmac, Mac};
use secrecy::ExposeSecret;
use serde::Deserialize;
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{PaymentsConfig, WebhookVerification};
use crate::error::{PaymentError, Result};
use crate::provider::{META_GROUP_ID, META_LINE_ID, META_PLAN};
use crate::reconcile::{CompletedCheckout, QuotaReconciler};
use crate::store::{ApplyOutcome, QuotaState, QuotaStore};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the webhook signature
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Event type that grants quota
pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";

/// Default bound on one reconciliation
pub const DEFAULT_RECONCILE_TIMEOUT: Duration = Duration::from_secs(10);

/// Compute a `stripe-signature` header value for a payload.
///
/// Mirrors what Stripe sends: `t=<timestamp>,v1=<hex hmac>`.
pub fn signature_header(payload: &[u8], secret: &str, timestamp: i64) -> Result<String> {
    let mac = signed_mac(payload, secret, &timestamp.to_string())?;
    Ok(format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes())))
}

/// Verify a `stripe-signature` header against the raw payload.
///
/// Any `v1` entry may match; other schemes are ignored. The timestamp must be
/// within `tolerance_secs` of `now`.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: i64,
    now: i64,
) -> Result<()> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for item in header.split(',') {
        match item.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp_str =
        timestamp.ok_or_else(|| PaymentError::SignatureInvalid("missing timestamp".into()))?;
    let timestamp = timestamp_str
        .parse::<i64>()
        .map_err(|_| PaymentError::SignatureInvalid("malformed timestamp".into()))?;

    if signatures.is_empty() {
        return Err(PaymentError::SignatureInvalid("no v1 signature".into()));
    }

    if now.abs_diff(timestamp) > tolerance_secs.unsigned_abs() {
        return Err(PaymentError::SignatureInvalid(
            "timestamp outside tolerance".into(),
        ));
    }

    let expected = signed_mac(payload, secret, timestamp_str)?;
    let matched = signatures.iter().any(|candidate| {
        hex::decode(candidate)
            .is_ok_and(|bytes| expected.clone().verify_slice(&bytes).is_ok())
    });

    if matched {
        Ok(())
    } else {
        Err(PaymentError::SignatureInvalid("signature mismatch".into()))
    }
}

fn signed_mac(payload: &[u8], secret: &str, timestamp: &str) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| PaymentError::SignatureInvalid(format!("invalid secret: {e}")))?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

#[derive(Debug, Deserialize)]
struct EventEnvelope {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: EventData,
}

#[derive(Debug, Deserialize)]
struct EventData {
    object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct CheckoutObject {
    id: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
    #[serde(default)]
    customer: Option<serde_json::Value>,
}

/// Parsed webhook event
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookEvent {
    /// Checkout completed - grant quota
    CheckoutCompleted {
        event_id: String,
        session_id: Option<String>,
        customer_id: Option<String>,
        metadata: HashMap<String, String>,
    },

    /// Unhandled event type
    Other { event_id: String, event_type: String },
}

impl WebhookEvent {
    /// Parse an event envelope.
    pub fn from_json(payload: &[u8]) -> Result<Self> {
        let envelope: EventEnvelope = serde_json::from_slice(payload)
            .map_err(|e| PaymentError::WebhookParse(e.to_string()))?;

        if envelope.id.is_empty() {
            return Err(PaymentError::WebhookParse("event id is empty".into()));
        }

        if envelope.event_type != CHECKOUT_COMPLETED {
            return Ok(Self::Other {
                event_id: envelope.id,
                event_type: envelope.event_type,
            });
        }

        let object: CheckoutObject = serde_json::from_value(envelope.data.object)
            .map_err(|e| PaymentError::WebhookParse(format!("checkout session: {e}")))?;

        // `customer` is an id unless the event was sent expanded
        let customer_id = object.customer.and_then(|customer| match customer {
            serde_json::Value::String(id) => Some(id),
            serde_json::Value::Object(map) => map
                .get("id")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string),
            _ => None,
        });

        Ok(Self::CheckoutCompleted {
            event_id: envelope.id,
            session_id: object.id,
            customer_id,
            metadata: object.metadata,
        })
    }
}

/// What handling an event amounted to
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Quota granted
    Reconciled(QuotaState),

    /// Event id already reconciled
    Duplicate,

    /// Event type this service does not act on
    Ignored { event_type: String },

    /// Completed checkout that can never be applied; acknowledged so Stripe
    /// stops redelivering it
    Rejected { reason: String },
}

/// Webhook handler
pub struct WebhookHandler<S: QuotaStore + ?Sized> {
    verification: WebhookVerification,
    reconciler: QuotaReconciler<S>,
    reconcile_timeout: Duration,
}

impl<S: QuotaStore + ?Sized> WebhookHandler<S> {
    pub fn new(store: Arc<S>, config: &PaymentsConfig) -> Self {
        Self {
            verification: config.webhook.clone(),
            reconciler: QuotaReconciler::new(store, config.catalog.clone()),
            reconcile_timeout: DEFAULT_RECONCILE_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_reconcile_timeout(mut self, timeout: Duration) -> Self {
        self.reconcile_timeout = timeout;
        self
    }

    /// Verify webhook signature and parse event
    pub fn parse_event(&self, payload: &[u8], signature: Option<&str>) -> Result<WebhookEvent> {
        match &self.verification {
            WebhookVerification::Signed { secret, tolerance_secs } => {
                let signature = signature.ok_or_else(|| {
                    PaymentError::SignatureInvalid(format!("missing {SIGNATURE_HEADER} header"))
                })?;
                verify_signature(
                    payload,
                    signature,
                    secret.expose_secret(),
                    *tolerance_secs,
                    chrono::Utc::now().timestamp(),
                )?;
            }
            WebhookVerification::Unverified => {
                tracing::warn!("Accepting webhook without signature verification");
            }
        }

        WebhookEvent::from_json(payload)
    }

    /// Verify, parse and handle a raw webhook delivery.
    pub async fn process(&self, payload: &[u8], signature: Option<&str>) -> Result<WebhookOutcome> {
        let event = self.parse_event(payload, signature)?;
        self.handle(event).await
    }

    /// Process a webhook event
    ///
    /// Errors are limited to failures Stripe should redeliver for
    /// (persistence and timeouts). Bad metadata on a completed checkout is
    /// reported as `Rejected`.
    pub async fn handle(&self, event: WebhookEvent) -> Result<WebhookOutcome> {
        match event {
            WebhookEvent::CheckoutCompleted {
                event_id,
                session_id,
                customer_id,
                metadata,
            } => {
                tracing::info!(event_id = %event_id, "Payment received");

                let checkout =
                    match completed_checkout(event_id, session_id, customer_id, &metadata) {
                        Ok(checkout) => checkout,
                        Err(e) => return Ok(rejected(&e)),
                    };

                let reconciled = tokio::time::timeout(
                    self.reconcile_timeout,
                    self.reconciler.reconcile(&checkout),
                )
                .await
                .map_err(|_| {
                    PaymentError::Timeout(format!(
                        "reconciling {} took longer than {:?}",
                        checkout.event_id, self.reconcile_timeout
                    ))
                })?;

                match reconciled {
                    Ok((ApplyOutcome::Applied, quota)) => Ok(WebhookOutcome::Reconciled(quota)),
                    Ok((ApplyOutcome::Duplicate, _)) => Ok(WebhookOutcome::Duplicate),
                    Err(e) if e.is_retryable() => Err(e),
                    Err(e) => Ok(rejected(&e)),
                }
            }

            WebhookEvent::Other { event_id, event_type } => {
                tracing::debug!(
                    event_id = %event_id,
                    event_type = %event_type,
                    "Unhandled webhook event"
                );
                Ok(WebhookOutcome::Ignored { event_type })
            }
        }
    }
}

fn completed_checkout(
    event_id: String,
    checkout_session_id: Option<String>,
    customer_id: Option<String>,
    metadata: &HashMap<String, String>,
) -> Result<CompletedCheckout> {
    let field = |key: &str| {
        metadata
            .get(key)
            .filter(|value| !value.is_empty())
            .cloned()
            .ok_or_else(|| PaymentError::WebhookParse(format!("metadata.{key} missing")))
    };

    Ok(CompletedCheckout {
        line_id: field(META_LINE_ID)?,
        group_id: field(META_GROUP_ID)?,
        plan: field(META_PLAN)?,
        event_id,
        checkout_session_id,
        customer_id,
    })
}

fn rejected(err: &PaymentError) -> WebhookOutcome {
    tracing::warn!(error = %err, "Completed checkout cannot be reconciled");
    WebhookOutcome::Rejected {
        reason: err.to_string(),
    }
}
