//! Quota Reconciliation
//!
//! Applies a completed checkout to the buyer's quota exactly once per
//! Stripe event.

use chrono::Utc;
use std::sync::Arc;

use crate::error::Result;
use crate::plan::PlanCatalog;
use crate::store::{ApplyOutcome, PurchaseRecord, QuotaState, QuotaStore};

/// A completed checkout, as read from verified event metadata
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletedCheckout {
    pub event_id: String,
    pub line_id: String,
    pub group_id: String,
    /// Plan name exactly as it appeared in metadata
    pub plan: String,
    pub checkout_session_id: Option<String>,
    pub customer_id: Option<String>,
}

/// Writes purchases and quota through a `QuotaStore`
pub struct QuotaReconciler<S: QuotaStore + ?Sized> {
    store: Arc<S>,
    catalog: PlanCatalog,
}

impl<S: QuotaStore + ?Sized> QuotaReconciler<S> {
    pub const fn new(store: Arc<S>, catalog: PlanCatalog) -> Self {
        Self { store, catalog }
    }

    /// Grant the plan's quota for a completed checkout.
    ///
    /// The plan only has to exist in the catalog; a price removed after the
    /// session was created does not block reconciliation.
    pub async fn reconcile(
        &self,
        checkout: &CompletedCheckout,
    ) -> Result<(ApplyOutcome, QuotaState)> {
        let tier = self.catalog.entry(&checkout.plan)?.tier;
        let now = Utc::now();

        let purchase = PurchaseRecord {
            event_id: checkout.event_id.clone(),
            line_id: checkout.line_id.clone(),
            group_id: checkout.group_id.clone(),
            plan: tier.plan,
            checkout_session_id: checkout.checkout_session_id.clone(),
            customer_id: checkout.customer_id.clone(),
            created_at: now,
        };
        let quota = QuotaState {
            line_id: checkout.line_id.clone(),
            group_id: checkout.group_id.clone(),
            plan: tier.plan,
            quota: tier.quota,
            group_limit: tier.group_limit,
            updated_at: now,
        };

        let outcome = self.store.apply_purchase(&purchase, &quota).await?;

        match outcome {
            ApplyOutcome::Applied => tracing::info!(
                event_id = %checkout.event_id,
                line_id = %quota.line_id,
                group_id = %quota.group_id,
                plan = %quota.plan,
                quota = quota.quota,
                group_limit = quota.group_limit,
                "Granted plan quota"
            ),
            ApplyOutcome::Duplicate => tracing::info!(
                event_id = %checkout.event_id,
                "Event already reconciled, skipping"
            ),
        }

        Ok((outcome, quota))
    }
}
