//! Payment Provider Abstraction
//!
//! The three outbound calls this service makes to Stripe. `StripeClient`
//! implements them against the live API; tests substitute a recording double.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::Result;
use crate::plan::Plan;

/// Metadata keys carried on every checkout session
pub const META_LINE_ID: &str = "line_id";
pub const META_GROUP_ID: &str = "group_id";
pub const META_PLAN: &str = "plan";

/// Buyer identity attached to a checkout session and echoed back in its webhook
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutMetadata {
    pub line_id: String,
    pub group_id: String,
    pub plan: Plan,
}

impl CheckoutMetadata {
    pub fn to_map(&self) -> HashMap<String, String> {
        HashMap::from([
            (META_LINE_ID.to_string(), self.line_id.clone()),
            (META_GROUP_ID.to_string(), self.group_id.clone()),
            (META_PLAN.to_string(), self.plan.as_str().to_string()),
        ])
    }
}

/// Parameters for a hosted subscription checkout
#[derive(Clone, Debug)]
pub struct NewCheckoutSession {
    pub price_id: String,
    pub metadata: CheckoutMetadata,
    pub success_url: String,
    pub cancel_url: String,
}

/// A created checkout session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Stripe session ID
    pub id: String,

    /// URL to redirect the buyer to
    pub url: String,
}

/// A created billing portal session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PortalSession {
    pub id: String,
    pub url: String,
}

/// Outbound payment provider operations
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Create a hosted checkout session in subscription mode.
    async fn create_checkout_session(
        &self,
        params: NewCheckoutSession,
    ) -> Result<CheckoutSession>;

    /// Resolve a checkout session to the customer it created.
    ///
    /// Fails with `SessionNotFound` when the session is unknown or has no customer.
    async fn checkout_customer(&self, session_id: &str) -> Result<String>;

    /// Create a billing portal session for a customer.
    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<PortalSession>;
}
