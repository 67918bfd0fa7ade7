//! Plan Catalog
//!
//! Maps each subscription plan to its Stripe price, character quota and
//! group member limit.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{PaymentError, Result};

/// Subscription plan tiers
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Plan {
    Starter,
    Basic,
    Pro,
    Expert,
}

impl Plan {
    pub const ALL: [Self; 4] = [Self::Starter, Self::Basic, Self::Pro, Self::Expert];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Starter => "Starter",
            Self::Basic => "Basic",
            Self::Pro => "Pro",
            Self::Expert => "Expert",
        }
    }

    /// Environment variable holding this plan's Stripe price id
    pub const fn price_env_var(self) -> &'static str {
        match self {
            Self::Starter => "PRICE_ID_STARTER",
            Self::Basic => "PRICE_ID_BASIC",
            Self::Pro => "PRICE_ID_PRO",
            Self::Expert => "PRICE_ID_EXPERT",
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Plan {
    type Err = PaymentError;

    /// Plan names are matched exactly, as the storefront sends them.
    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|plan| plan.as_str() == s)
            .ok_or_else(|| PaymentError::InvalidPlan(s.to_string()))
    }
}

/// Quota granted by one plan tier
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlanTier {
    pub plan: Plan,
    /// Character allotment
    pub quota: i64,
    /// Maximum members in the buyer's group
    pub group_limit: i32,
}

/// Tier table. Adding a plan means adding a row here and a `Plan` variant.
pub const PLAN_TIERS: [PlanTier; 4] = [
    PlanTier {
        plan: Plan::Starter,
        quota: 300_000,
        group_limit: 1,
    },
    PlanTier {
        plan: Plan::Basic,
        quota: 1_000_000,
        group_limit: 3,
    },
    PlanTier {
        plan: Plan::Pro,
        quota: 2_000_000,
        group_limit: 5,
    },
    PlanTier {
        plan: Plan::Expert,
        quota: 4_000_000,
        group_limit: 10,
    },
];

/// One catalog row: tier plus the configured price
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlanEntry {
    pub tier: PlanTier,
    pub price_id: Option<String>,
}

impl PlanEntry {
    pub const fn plan(&self) -> Plan {
        self.tier.plan
    }
}

/// Immutable plan catalog, built once at startup
#[derive(Clone, Debug, Default)]
pub struct PlanCatalog {
    entries: BTreeMap<Plan, PlanEntry>,
}

impl PlanCatalog {
    /// Build the catalog from the tier table and the configured price ids.
    ///
    /// Blank price ids count as unset.
    pub fn new(prices: impl IntoIterator<Item = (Plan, String)>) -> Self {
        let mut prices: BTreeMap<Plan, String> = prices
            .into_iter()
            .filter(|(_, price)| !price.trim().is_empty())
            .collect();

        let entries = PLAN_TIERS
            .iter()
            .map(|tier| {
                (
                    tier.plan,
                    PlanEntry {
                        tier: *tier,
                        price_id: prices.remove(&tier.plan),
                    },
                )
            })
            .collect();

        Self { entries }
    }

    /// Look up a plan by its wire name.
    pub fn entry(&self, plan: &str) -> Result<&PlanEntry> {
        let plan = plan.parse::<Plan>()?;
        self.entries
            .get(&plan)
            .ok_or_else(|| PaymentError::InvalidPlan(plan.to_string()))
    }

    /// Look up a plan that can be purchased, returning its entry and price id.
    pub fn purchasable(&self, plan: &str) -> Result<(&PlanEntry, &str)> {
        let entry = self.entry(plan)?;
        let price = entry
            .price_id
            .as_deref()
            .ok_or_else(|| PaymentError::InvalidPlan(format!("{plan} has no price configured")))?;
        Ok((entry, price))
    }

    /// Configured prices, keyed by plan name
    pub fn prices(&self) -> BTreeMap<&'static str, &str> {
        self.entries
            .values()
            .filter_map(|entry| {
                entry
                    .price_id
                    .as_deref()
                    .map(|price| (entry.plan().as_str(), price))
            })
            .collect()
    }
}
