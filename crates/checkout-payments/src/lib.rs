//! # checkout-payments
//!
//! Stripe subscription checkout and quota reconciliation for plan-checkout.
//!
//! ## Flow
//!
//! ```text
//! ┌────────────┐   plan, line_id,   ┌────────────────┐   hosted page   ┌────────┐
//! │ Storefront │─── group_id ──────▶│ start_checkout │────────────────▶│ Stripe │
//! └────────────┘                    └────────────────┘                 └───┬────┘
//!                                                                          │ checkout.session.completed
//! ┌────────────┐   once per event   ┌────────────────┐    verified         │
//! │ QuotaStore │◀───────────────────│ WebhookHandler │◀────────────────────┘
//! └────────────┘                    └────────────────┘
//! ```
//!
//! Plans map to a character quota and a group member limit through
//! [`PLAN_TIERS`]. Each Stripe event id is applied at most once, so webhook
//! redelivery never grants quota twice.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use checkout_payments::{start_checkout, CheckoutRequest, PaymentsConfig, StripeClient};
//!
//! let config = PaymentsConfig::from_env()?;
//! let stripe = StripeClient::from_config(&config);
//!
//! let session = start_checkout(&stripe, &config, &CheckoutRequest {
//!     plan: "Basic".into(),
//!     line_id: "U4af4980629".into(),
//!     group_id: "Ca56f94637c".into(),
//! }).await?;
//!
//! // Redirect the buyer to: session.url
//! ```

mod checkout;
mod config;
mod error;
mod plan;
mod portal;
#[cfg(feature = "postgres")]
mod postgres;
mod provider;
mod reconcile;
mod store;
mod webhook;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use checkout::{CheckoutRequest, StripeClient, start_checkout};
pub use config::{DEFAULT_WEBHOOK_TOLERANCE_SECS, PaymentsConfig, WebhookVerification};
pub use error::{PaymentError, Result};
pub use plan::{PLAN_TIERS, Plan, PlanCatalog, PlanEntry, PlanTier};
pub use portal::open_billing_portal;
#[cfg(feature = "postgres")]
pub use postgres::PgQuotaStore;
pub use provider::{
    CheckoutMetadata, CheckoutSession, NewCheckoutSession, PaymentProvider, PortalSession,
};
pub use reconcile::{CompletedCheckout, QuotaReconciler};
pub use store::{ApplyOutcome, MemoryQuotaStore, PurchaseRecord, QuotaState, QuotaStore};
pub use webhook::{
    CHECKOUT_COMPLETED, DEFAULT_RECONCILE_TIMEOUT, SIGNATURE_HEADER, WebhookEvent, WebhookHandler,
    WebhookOutcome, signature_header, verify_signature,
};
