//! Test doubles for the provider and store seams.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::{PaymentError, Result};
use crate::provider::{CheckoutSession, NewCheckoutSession, PaymentProvider, PortalSession};
use crate::store::{ApplyOutcome, MemoryQuotaStore, PurchaseRecord, QuotaState, QuotaStore};

/// Provider that records every call instead of contacting Stripe.
#[derive(Default)]
pub struct RecordingProvider {
    counter: AtomicU64,
    failure: Option<String>,
    sessions: HashMap<String, String>,
    checkout_calls: Mutex<Vec<NewCheckoutSession>>,
    portal_calls: Mutex<Vec<(String, String)>>,
}

impl RecordingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider whose checkout calls fail with the given Stripe message.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    /// Register a checkout session id that resolves to `customer_id`.
    #[must_use]
    pub fn with_session(
        mut self,
        session_id: impl Into<String>,
        customer_id: impl Into<String>,
    ) -> Self {
        self.sessions.insert(session_id.into(), customer_id.into());
        self
    }

    pub fn checkout_calls(&self) -> Vec<NewCheckoutSession> {
        self.checkout_calls.lock().unwrap().clone()
    }

    /// `(customer_id, return_url)` per portal call
    pub fn portal_calls(&self) -> Vec<(String, String)> {
        self.portal_calls.lock().unwrap().clone()
    }

    fn next_id(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentProvider for RecordingProvider {
    async fn create_checkout_session(
        &self,
        params: NewCheckoutSession,
    ) -> Result<CheckoutSession> {
        self.checkout_calls.lock().unwrap().push(params);
        if let Some(message) = &self.failure {
            return Err(PaymentError::PaymentProvider(message.clone()));
        }

        let id = format!("cs_test_{}", self.next_id());
        Ok(CheckoutSession {
            url: format!("https://checkout.stripe.com/c/pay/{id}"),
            id,
        })
    }

    async fn checkout_customer(&self, session_id: &str) -> Result<String> {
        self.sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| PaymentError::SessionNotFound(session_id.to_string()))
    }

    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<PortalSession> {
        self.portal_calls
            .lock()
            .unwrap()
            .push((customer_id.to_string(), return_url.to_string()));

        let id = format!("bps_test_{}", self.next_id());
        Ok(PortalSession {
            url: format!("https://billing.stripe.com/p/session/{id}"),
            id,
        })
    }
}

/// Memory store whose first `failures` writes fail, as a database outage would.
pub struct FlakyStore {
    inner: MemoryQuotaStore,
    failures: AtomicUsize,
}

impl FlakyStore {
    pub fn new(failures: usize) -> Self {
        Self {
            inner: MemoryQuotaStore::new(),
            failures: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl QuotaStore for FlakyStore {
    async fn apply_purchase(
        &self,
        purchase: &PurchaseRecord,
        quota: &QuotaState,
    ) -> Result<ApplyOutcome> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(PaymentError::Persistence("connection refused".into()));
        }
        self.inner.apply_purchase(purchase, quota).await
    }

    async fn quota(&self, line_id: &str, group_id: &str) -> Result<Option<QuotaState>> {
        self.inner.quota(line_id, group_id).await
    }

    async fn purchases(&self, line_id: &str, group_id: &str) -> Result<Vec<PurchaseRecord>> {
        self.inner.purchases(line_id, group_id).await
    }

    fn backend(&self) -> &'static str {
        "flaky-memory"
    }
}

/// Memory store that stalls every write, as a locked table would.
pub struct SlowStore {
    inner: MemoryQuotaStore,
    delay: Duration,
}

impl SlowStore {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: MemoryQuotaStore::new(),
            delay,
        }
    }
}

#[async_trait]
impl QuotaStore for SlowStore {
    async fn apply_purchase(
        &self,
        purchase: &PurchaseRecord,
        quota: &QuotaState,
    ) -> Result<ApplyOutcome> {
        tokio::time::sleep(self.delay).await;
        self.inner.apply_purchase(purchase, quota).await
    }

    async fn quota(&self, line_id: &str, group_id: &str) -> Result<Option<QuotaState>> {
        self.inner.quota(line_id, group_id).await
    }

    async fn purchases(&self, line_id: &str, group_id: &str) -> Result<Vec<PurchaseRecord>> {
        self.inner.purchases(line_id, group_id).await
    }

    fn backend(&self) -> &'static str {
        "slow-memory"
    }
}
