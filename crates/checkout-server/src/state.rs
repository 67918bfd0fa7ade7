//! Application State

use std::sync::Arc;
use std::time::Duration;

use checkout_payments::{PaymentProvider, PaymentsConfig, QuotaStore, WebhookHandler};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Stripe and storefront settings, read once at startup
    pub config: Arc<PaymentsConfig>,

    /// Stripe (or a test double)
    pub provider: Arc<dyn PaymentProvider>,

    /// Purchase and quota storage
    pub store: Arc<dyn QuotaStore>,

    /// Verifies and reconciles webhook deliveries
    pub webhooks: Arc<WebhookHandler<dyn QuotaStore>>,
}

impl AppState {
    pub fn new(
        config: PaymentsConfig,
        provider: Arc<dyn PaymentProvider>,
        store: Arc<dyn QuotaStore>,
        reconcile_timeout: Duration,
    ) -> Self {
        let webhooks =
            WebhookHandler::new(store.clone(), &config).with_reconcile_timeout(reconcile_timeout);

        Self {
            config: Arc::new(config),
            provider,
            store,
            webhooks: Arc::new(webhooks),
        }
    }
}
