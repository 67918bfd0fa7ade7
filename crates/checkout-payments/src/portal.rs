//! Billing Portal
//!
//! Turns a checkout session id from the success page into a Stripe billing
//! portal session for the customer that checkout created.

use crate::config::PaymentsConfig;
use crate::error::{PaymentError, Result};
use crate::provider::{PaymentProvider, PortalSession};

/// Resolve the checkout session's customer and open a portal session for them.
pub async fn open_billing_portal<P>(
    provider: &P,
    config: &PaymentsConfig,
    checkout_session_id: &str,
) -> Result<PortalSession>
where
    P: PaymentProvider + ?Sized,
{
    let checkout_session_id = checkout_session_id.trim();
    if checkout_session_id.is_empty() {
        return Err(PaymentError::InvalidRequest("sessionId is required.".into()));
    }

    let customer_id = provider.checkout_customer(checkout_session_id).await?;
    let session = provider
        .create_portal_session(&customer_id, config.portal_return_url())
        .await?;

    tracing::info!(
        checkout_session_id,
        customer_id = %customer_id,
        portal_session_id = %session.id,
        "Created billing portal session"
    );

    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WebhookVerification;
    use crate::plan::PlanCatalog;
    use crate::testing::RecordingProvider;
    use secrecy::SecretString;

    fn config() -> PaymentsConfig {
        PaymentsConfig {
            secret_key: SecretString::new("sk_test".into()),
            publishable_key: "pk_test".into(),
            webhook: WebhookVerification::Unverified,
            domain: "https://shop.example.com".into(),
            catalog: PlanCatalog::default(),
        }
    }

    #[tokio::test]
    async fn test_portal_for_known_session() {
        let provider = RecordingProvider::new().with_session("cs_test_known", "cus_123");
        let session = open_billing_portal(&provider, &config(), "cs_test_known")
            .await
            .unwrap();

        assert!(session.url.starts_with("https://billing.stripe.com/"));
        assert_eq!(
            provider.portal_calls(),
            vec![("cus_123".to_string(), "https://shop.example.com".to_string())]
        );
    }

    #[tokio::test]
    async fn test_unknown_session_not_found() {
        let provider = RecordingProvider::new();
        let err = open_billing_portal(&provider, &config(), "cs_test_missing")
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::SessionNotFound(_)));
        assert!(provider.portal_calls().is_empty());
    }
}
