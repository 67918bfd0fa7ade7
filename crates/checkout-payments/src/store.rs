//! Quota Storage
//!
//! Purchase records, per-buyer quota state and the processed-event set that
//! makes webhook reconciliation idempotent.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::error::{PaymentError, Result};
use crate::plan::Plan;

/// One completed checkout. Append-only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRecord {
    /// Stripe event id that produced this purchase
    pub event_id: String,
    pub line_id: String,
    pub group_id: String,
    pub plan: Plan,
    pub checkout_session_id: Option<String>,
    pub customer_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Current quota for a buyer within a group. Last write wins.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaState {
    pub line_id: String,
    pub group_id: String,
    pub plan: Plan,
    /// Character allotment
    pub quota: i64,
    pub group_limit: i32,
    pub updated_at: DateTime<Utc>,
}

/// Result of applying a purchase
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// First delivery: purchase recorded and quota written
    Applied,
    /// Event id seen before: nothing changed
    Duplicate,
}

/// Quota storage trait
#[async_trait]
pub trait QuotaStore: Send + Sync {
    /// Record the purchase and upsert the quota in one atomic step, keyed on
    /// `purchase.event_id`. A repeated event id changes nothing.
    async fn apply_purchase(
        &self,
        purchase: &PurchaseRecord,
        quota: &QuotaState,
    ) -> Result<ApplyOutcome>;

    /// Get quota state for a buyer in a group
    async fn quota(&self, line_id: &str, group_id: &str) -> Result<Option<QuotaState>>;

    /// Purchases recorded for a buyer in a group, oldest first
    async fn purchases(&self, line_id: &str, group_id: &str) -> Result<Vec<PurchaseRecord>>;

    /// Short backend name for health output
    fn backend(&self) -> &'static str;

    /// Check the backend is reachable
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
struct MemoryState {
    processed: HashSet<String>,
    purchases: Vec<PurchaseRecord>,
    quotas: HashMap<(String, String), QuotaState>,
}

/// In-memory quota store (for development and tests)
#[derive(Default)]
pub struct MemoryQuotaStore {
    state: Mutex<MemoryState>,
}

impl MemoryQuotaStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| PaymentError::Persistence("memory store lock poisoned".into()))
    }
}

#[async_trait]
impl QuotaStore for MemoryQuotaStore {
    async fn apply_purchase(
        &self,
        purchase: &PurchaseRecord,
        quota: &QuotaState,
    ) -> Result<ApplyOutcome> {
        let mut state = self.lock()?;

        if !state.processed.insert(purchase.event_id.clone()) {
            return Ok(ApplyOutcome::Duplicate);
        }

        state.purchases.push(purchase.clone());
        state.quotas.insert(
            (quota.line_id.clone(), quota.group_id.clone()),
            quota.clone(),
        );

        Ok(ApplyOutcome::Applied)
    }

    async fn quota(&self, line_id: &str, group_id: &str) -> Result<Option<QuotaState>> {
        let state = self.lock()?;
        Ok(state
            .quotas
            .get(&(line_id.to_string(), group_id.to_string()))
            .cloned())
    }

    async fn purchases(&self, line_id: &str, group_id: &str) -> Result<Vec<PurchaseRecord>> {
        let state = self.lock()?;
        Ok(state
            .purchases
            .iter()
            .filter(|p| p.line_id == line_id && p.group_id == group_id)
            .cloned()
            .collect())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
