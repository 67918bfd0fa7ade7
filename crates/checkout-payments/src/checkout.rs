//! Stripe Checkout Integration
//!
//! Hosted subscription checkout: validate the plan, ask Stripe for a session,
//! hand the buyer its URL.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use stripe::{
    BillingPortalSession, CheckoutSession as StripeCheckoutSession, CheckoutSessionId,
    CheckoutSessionMode, Client, CreateBillingPortalSession, CreateCheckoutSession,
    CreateCheckoutSessionLineItems, CustomerId, StripeError,
};

use crate::config::PaymentsConfig;
use crate::error::{PaymentError, Result};
use crate::provider::{
    CheckoutMetadata, CheckoutSession, NewCheckoutSession, PaymentProvider, PortalSession,
};

/// Request to create a checkout session, as sent by the storefront
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CheckoutRequest {
    /// Plan name (`Starter`, `Basic`, `Pro`, `Expert`)
    #[serde(default)]
    pub plan: String,

    /// Buyer identifier
    #[serde(default)]
    pub line_id: String,

    /// Group the buyer purchases for
    #[serde(default)]
    pub group_id: String,
}

/// Validate a checkout request and create the hosted session.
///
/// The plan is checked against the catalog before Stripe is contacted.
pub async fn start_checkout<P>(
    provider: &P,
    config: &PaymentsConfig,
    request: &CheckoutRequest,
) -> Result<CheckoutSession>
where
    P: PaymentProvider + ?Sized,
{
    let (entry, price_id) = config.catalog.purchasable(&request.plan)?;

    if request.line_id.trim().is_empty() || request.group_id.trim().is_empty() {
        return Err(PaymentError::InvalidRequest(
            "line_id and group_id are required.".into(),
        ));
    }

    let metadata = CheckoutMetadata {
        line_id: request.line_id.clone(),
        group_id: request.group_id.clone(),
        plan: entry.plan(),
    };

    let session = provider
        .create_checkout_session(NewCheckoutSession {
            price_id: price_id.to_string(),
            metadata,
            success_url: config.success_url(),
            cancel_url: config.cancel_url(),
        })
        .await?;

    tracing::info!(
        session_id = %session.id,
        plan = %entry.plan(),
        line_id = %request.line_id,
        group_id = %request.group_id,
        "Created checkout session"
    );

    Ok(session)
}

/// Stripe client wrapper
pub struct StripeClient {
    client: Client,
}

impl StripeClient {
    /// Create a new Stripe client
    pub fn new(secret_key: &str) -> Self {
        Self {
            client: Client::new(secret_key),
        }
    }

    /// Create from loaded configuration
    pub fn from_config(config: &PaymentsConfig) -> Self {
        Self::new(config.secret_key.expose_secret())
    }
}

#[async_trait]
impl PaymentProvider for StripeClient {
    async fn create_checkout_session(
        &self,
        request: NewCheckoutSession,
    ) -> Result<CheckoutSession> {
        let mut params = CreateCheckoutSession::new();
        params.success_url = Some(&request.success_url);
        params.cancel_url = Some(&request.cancel_url);
        params.mode = Some(CheckoutSessionMode::Subscription);
        params.metadata = Some(request.metadata.to_map());
        params.line_items = Some(vec![CreateCheckoutSessionLineItems {
            price: Some(request.price_id.clone()),
            quantity: Some(1),
            ..Default::default()
        }]);

        let session = StripeCheckoutSession::create(&self.client, params)
            .await
            .map_err(provider_error)?;

        let url = session
            .url
            .ok_or_else(|| PaymentError::PaymentProvider("No checkout URL returned".into()))?;

        Ok(CheckoutSession {
            id: session.id.to_string(),
            url,
        })
    }

    async fn checkout_customer(&self, session_id: &str) -> Result<String> {
        let id = session_id
            .parse::<CheckoutSessionId>()
            .map_err(|_| PaymentError::SessionNotFound(session_id.to_string()))?;

        let session = StripeCheckoutSession::retrieve(&self.client, &id, &[])
            .await
            .map_err(|e| match e {
                StripeError::Stripe(ref req) if req.http_status == 404 => {
                    PaymentError::SessionNotFound(session_id.to_string())
                }
                other => provider_error(other),
            })?;

        session
            .customer
            .map(|customer| customer.id().to_string())
            .ok_or_else(|| PaymentError::SessionNotFound(format!("{session_id} has no customer")))
    }

    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<PortalSession> {
        let customer = customer_id
            .parse::<CustomerId>()
            .map_err(|e| PaymentError::PaymentProvider(format!("Invalid customer ID: {e}")))?;

        let mut params = CreateBillingPortalSession::new(customer);
        params.return_url = Some(return_url);

        let session = BillingPortalSession::create(&self.client, params)
            .await
            .map_err(provider_error)?;

        Ok(PortalSession {
            id: session.id.to_string(),
            url: session.url,
        })
    }
}

fn provider_error(err: StripeError) -> PaymentError {
    match err {
        StripeError::Stripe(req) => PaymentError::PaymentProvider(
            req.message
                .unwrap_or_else(|| format!("Stripe returned HTTP {}", req.http_status)),
        ),
        other => PaymentError::PaymentProvider(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WebhookVerification;
    use crate::plan::{Plan, PlanCatalog};
    use crate::testing::RecordingProvider;
    use secrecy::SecretString;

    fn config() -> PaymentsConfig {
        PaymentsConfig {
            secret_key: SecretString::new("sk_test".into()),
            publishable_key: "pk_test".into(),
            webhook: WebhookVerification::Unverified,
            domain: "https://shop.example.com".into(),
            catalog: PlanCatalog::new([(Plan::Basic, "price_basic".to_string())]),
        }
    }

    fn request(plan: &str) -> CheckoutRequest {
        CheckoutRequest {
            plan: plan.into(),
            line_id: "U1".into(),
            group_id: "G1".into(),
        }
    }

    #[tokio::test]
    async fn test_checkout_carries_metadata() {
        let provider = RecordingProvider::new();
        let session = start_checkout(&provider, &config(), &request("Basic"))
            .await
            .unwrap();

        assert!(session.url.starts_with("https://checkout.stripe.com/"));
        let calls = provider.checkout_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].price_id, "price_basic");
        assert_eq!(calls[0].metadata.plan, Plan::Basic);
        assert_eq!(calls[0].metadata.line_id, "U1");
        assert_eq!(calls[0].cancel_url, "https://shop.example.com/canceled.html");
    }

    #[tokio::test]
    async fn test_invalid_plan_skips_provider() {
        let provider = RecordingProvider::new();
        for plan in ["", "Gold", "basic", "Expert"] {
            let err = start_checkout(&provider, &config(), &request(plan))
                .await
                .unwrap_err();
            assert!(matches!(err, PaymentError::InvalidPlan(_)), "{plan}: {err}");
        }
        assert!(provider.checkout_calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_ids_rejected() {
        let provider = RecordingProvider::new();
        let mut req = request("Basic");
        req.group_id = String::new();
        let err = start_checkout(&provider, &config(), &req).await.unwrap_err();
        assert!(matches!(err, PaymentError::InvalidRequest(_)));
        assert!(provider.checkout_calls().is_empty());
    }

    #[tokio::test]
    async fn test_provider_failure_surfaces_message() {
        let provider = RecordingProvider::failing("No such price: 'price_basic'");
        let err = start_checkout(&provider, &config(), &request("Basic"))
            .await
            .unwrap_err();
        assert_eq!(err.user_message(), "No such price: 'price_basic'");
    }
}
