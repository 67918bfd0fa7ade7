#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{HeaderValue, Request, Response},
};
use checkout_payments::{
    MemoryQuotaStore, PaymentsConfig, Plan, PlanCatalog, QuotaStore, WebhookVerification,
    testing::RecordingProvider,
};
use checkout_server::{AppState, app};
use http_body_util::BodyExt;
use secrecy::SecretString;
use serde_json::{Value, json};
use tower::ServiceExt;

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";
pub const STOREFRONT: &str = "https://saygo-translator.carrd.co";

pub struct TestApp {
    pub router: Router,
    pub provider: Arc<RecordingProvider>,
    pub store: Arc<dyn QuotaStore>,
}

pub fn payments_config(webhook: WebhookVerification) -> PaymentsConfig {
    PaymentsConfig {
        secret_key: SecretString::new("sk_test_123".into()),
        publishable_key: "pk_test_123".into(),
        webhook,
        domain: "https://shop.example.com".into(),
        catalog: PlanCatalog::new([
            (Plan::Starter, "price_starter".to_string()),
            (Plan::Basic, "price_basic".to_string()),
            (Plan::Expert, "price_expert".to_string()),
        ]),
    }
}

pub fn signed() -> WebhookVerification {
    WebhookVerification::Signed {
        secret: SecretString::new(WEBHOOK_SECRET.into()),
        tolerance_secs: 300,
    }
}

impl TestApp {
    pub fn spawn() -> Self {
        Self::with(signed(), RecordingProvider::new(), Arc::new(MemoryQuotaStore::new()))
    }

    pub fn with(
        webhook: WebhookVerification,
        provider: RecordingProvider,
        store: Arc<dyn QuotaStore>,
    ) -> Self {
        Self::with_timeout(webhook, provider, store, Duration::from_secs(5))
    }

    pub fn with_timeout(
        webhook: WebhookVerification,
        provider: RecordingProvider,
        store: Arc<dyn QuotaStore>,
        reconcile_timeout: Duration,
    ) -> Self {
        let provider = Arc::new(provider);
        let state = AppState::new(
            payments_config(webhook),
            provider.clone(),
            store.clone(),
            reconcile_timeout,
        );
        let router = app(state, vec![HeaderValue::from_static(STOREFRONT)]);

        Self {
            router,
            provider,
            store,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> Response<Body> {
        self.send(
            Request::post(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn post_webhook(&self, payload: &[u8], signature: Option<&str>) -> Response<Body> {
        let mut request = Request::post("/webhook").header("content-type", "application/json");
        if let Some(signature) = signature {
            request = request.header("stripe-signature", signature);
        }
        self.send(request.body(Body::from(payload.to_vec())).unwrap())
            .await
    }
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// A `checkout.session.completed` event as Stripe sends it, with stable formatting
pub fn completed_event(event_id: &str, plan: &str) -> Vec<u8> {
    serde_json::to_vec_pretty(&json!({
        "id": event_id,
        "object": "event",
        "api_version": "2020-08-27",
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": "cs_test_a1b2",
                "object": "checkout.session",
                "mode": "subscription",
                "customer": "cus_123",
                "subscription": "sub_123",
                "metadata": { "line_id": "U1", "group_id": "G1", "plan": plan }
            }
        }
    }))
    .unwrap()
}

pub fn sign(payload: &[u8]) -> String {
    checkout_payments::signature_header(payload, WEBHOOK_SECRET, chrono::Utc::now().timestamp())
        .unwrap()
}
