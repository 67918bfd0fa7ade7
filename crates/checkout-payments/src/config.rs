//! Payments Configuration
//!
//! Read once at startup from the environment (or any key lookup in tests)
//! and shared immutably afterwards.

use secrecy::SecretString;

use crate::error::{PaymentError, Result};
use crate::plan::{Plan, PlanCatalog};

/// Default signature timestamp tolerance, in seconds
pub const DEFAULT_WEBHOOK_TOLERANCE_SECS: i64 = 300;

/// How inbound webhook bodies are authenticated
#[derive(Clone, Debug)]
pub enum WebhookVerification {
    /// Verify the `stripe-signature` header with the endpoint secret
    Signed {
        secret: SecretString,
        tolerance_secs: i64,
    },

    /// Accept bodies as-is. Only reachable through `ALLOW_UNVERIFIED_WEBHOOKS=true`.
    Unverified,
}

impl WebhookVerification {
    pub const fn is_unverified(&self) -> bool {
        matches!(self, Self::Unverified)
    }
}

/// Stripe and storefront settings
#[derive(Clone, Debug)]
pub struct PaymentsConfig {
    pub secret_key: SecretString,
    pub publishable_key: String,
    pub webhook: WebhookVerification,
    /// Storefront base URL, without a trailing slash
    pub domain: String,
    pub catalog: PlanCatalog,
}

impl PaymentsConfig {
    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create from an arbitrary key lookup
    pub fn from_lookup<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret_key = SecretString::new(required(&get, "STRIPE_SECRET_KEY")?);
        let publishable_key = required(&get, "STRIPE_PUBLISHABLE_KEY")?;
        let domain = required(&get, "DOMAIN")?.trim_end_matches('/').to_string();

        let allow_unverified = flag(&get, "ALLOW_UNVERIFIED_WEBHOOKS")?;
        let webhook = match non_empty(&get, "STRIPE_WEBHOOK_SECRET") {
            Some(secret) => WebhookVerification::Signed {
                secret: SecretString::new(secret),
                tolerance_secs: number(
                    &get,
                    "WEBHOOK_TOLERANCE_SECS",
                    DEFAULT_WEBHOOK_TOLERANCE_SECS,
                )?,
            },
            None if allow_unverified => WebhookVerification::Unverified,
            None => {
                return Err(PaymentError::Config(
                    "STRIPE_WEBHOOK_SECRET not set (set ALLOW_UNVERIFIED_WEBHOOKS=true to accept unsigned events)"
                        .into(),
                ));
            }
        };

        let catalog = PlanCatalog::new(Plan::ALL.into_iter().filter_map(|plan| {
            non_empty(&get, plan.price_env_var()).map(|price| (plan, price))
        }));

        Ok(Self {
            secret_key,
            publishable_key,
            webhook,
            domain,
            catalog,
        })
    }

    /// Where Stripe sends the buyer after paying
    pub fn success_url(&self) -> String {
        format!("{}/success.html?session_id={{CHECKOUT_SESSION_ID}}", self.domain)
    }

    /// Where Stripe sends the buyer after abandoning checkout
    pub fn cancel_url(&self) -> String {
        format!("{}/canceled.html", self.domain)
    }

    /// Where the billing portal sends the buyer when they are done
    pub fn portal_return_url(&self) -> &str {
        &self.domain
    }
}

fn non_empty<F: Fn(&str) -> Option<String>>(get: &F, key: &str) -> Option<String> {
    get(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn required<F: Fn(&str) -> Option<String>>(get: &F, key: &str) -> Result<String> {
    non_empty(get, key).ok_or_else(|| PaymentError::Config(format!("{key} not set")))
}

fn flag<F: Fn(&str) -> Option<String>>(get: &F, key: &str) -> Result<bool> {
    match non_empty(get, key).as_deref() {
        None => Ok(false),
        Some("1" | "true" | "TRUE" | "yes") => Ok(true),
        Some("0" | "false" | "FALSE" | "no") => Ok(false),
        Some(other) => Err(PaymentError::Config(format!(
            "{key} must be true or false, got {other:?}"
        ))),
    }
}

fn number<F: Fn(&str) -> Option<String>>(get: &F, key: &str, default: i64) -> Result<i64> {
    non_empty(get, key).map_or(Ok(default), |value| {
        value
            .parse::<i64>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| PaymentError::Config(format!("{key} must be a positive integer")))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const BASE: [(&str, &str); 4] = [
        ("STRIPE_SECRET_KEY", "sk_test_123"),
        ("STRIPE_PUBLISHABLE_KEY", "pk_test_123"),
        ("DOMAIN", "https://shop.example.com/"),
        ("PRICE_ID_BASIC", "price_basic"),
    ];

    #[test]
    fn test_missing_webhook_secret_requires_opt_in() {
        let err = PaymentsConfig::from_lookup(lookup(&BASE)).unwrap_err();
        assert!(matches!(err, PaymentError::Config(_)));

        let mut pairs = BASE.to_vec();
        pairs.push(("ALLOW_UNVERIFIED_WEBHOOKS", "true"));
        let config = PaymentsConfig::from_lookup(lookup(&pairs)).unwrap();
        assert!(config.webhook.is_unverified());
    }

    #[test]
    fn test_signed_config() {
        let mut pairs = BASE.to_vec();
        pairs.push(("STRIPE_WEBHOOK_SECRET", "whsec_abc"));
        let config = PaymentsConfig::from_lookup(lookup(&pairs)).unwrap();

        match &config.webhook {
            WebhookVerification::Signed { secret, tolerance_secs } => {
                assert_eq!(secret.expose_secret(), "whsec_abc");
                assert_eq!(*tolerance_secs, DEFAULT_WEBHOOK_TOLERANCE_SECS);
            }
            WebhookVerification::Unverified => panic!("expected signed verification"),
        }
        assert_eq!(config.secret_key.expose_secret(), "sk_test_123");
        assert_eq!(config.domain, "https://shop.example.com");
        assert_eq!(
            config.success_url(),
            "https://shop.example.com/success.html?session_id={CHECKOUT_SESSION_ID}"
        );
        assert_eq!(config.cancel_url(), "https://shop.example.com/canceled.html");
        assert_eq!(config.catalog.prices().len(), 1);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut pairs = BASE.to_vec();
        pairs.push(("STRIPE_WEBHOOK_SECRET", "whsec_abc"));
        let config = PaymentsConfig::from_lookup(lookup(&pairs)).unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk_test_123"));
        assert!(!rendered.contains("whsec_abc"));
    }

    #[test]
    fn test_bad_flag_rejected() {
        let mut pairs = BASE.to_vec();
        pairs.push(("ALLOW_UNVERIFIED_WEBHOOKS", "maybe"));
        assert!(PaymentsConfig::from_lookup(lookup(&pairs)).is_err());
    }
}
