//! PostgreSQL Quota Store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use uuid::Uuid;

use crate::error::{PaymentError, Result};
use crate::plan::Plan;
use crate::store::{ApplyOutcome, PurchaseRecord, QuotaState, QuotaStore};

/// Quota store backed by a pooled PostgreSQL connection
#[derive(Clone)]
pub struct PgQuotaStore {
    pool: PgPool,
}

impl PgQuotaStore {
    /// Connect and build the pool.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        tracing::info!(max_connections, "Connecting to PostgreSQL");

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| PaymentError::Persistence(format!("Failed to connect: {e}")))?;

        tracing::info!("PostgreSQL connection pool established");
        Ok(Self { pool })
    }

    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run bundled migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        tracing::info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| PaymentError::Persistence(format!("Migration failed: {e}")))?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct QuotaRow {
    line_id: String,
    group_id: String,
    plan: String,
    quota: i64,
    group_limit: i32,
    updated_at: DateTime<Utc>,
}

impl TryFrom<QuotaRow> for QuotaState {
    type Error = PaymentError;

    fn try_from(row: QuotaRow) -> Result<Self> {
        Ok(Self {
            plan: stored_plan(&row.plan)?,
            line_id: row.line_id,
            group_id: row.group_id,
            quota: row.quota,
            group_limit: row.group_limit,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PurchaseRow {
    event_id: String,
    line_id: String,
    group_id: String,
    plan: String,
    checkout_session_id: Option<String>,
    customer_id: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<PurchaseRow> for PurchaseRecord {
    type Error = PaymentError;

    fn try_from(row: PurchaseRow) -> Result<Self> {
        Ok(Self {
            plan: stored_plan(&row.plan)?,
            event_id: row.event_id,
            line_id: row.line_id,
            group_id: row.group_id,
            checkout_session_id: row.checkout_session_id,
            customer_id: row.customer_id,
            created_at: row.created_at,
        })
    }
}

// A row written with a plan since removed from the catalog is a data problem, not a client one.
fn stored_plan(name: &str) -> Result<Plan> {
    name.parse::<Plan>()
        .map_err(|_| PaymentError::Persistence(format!("unknown plan {name:?} in storage")))
}

#[async_trait]
impl QuotaStore for PgQuotaStore {
    async fn apply_purchase(
        &self,
        purchase: &PurchaseRecord,
        quota: &QuotaState,
    ) -> Result<ApplyOutcome> {
        let mut tx = self.pool.begin().await?;

        // Concurrent deliveries serialize on the primary key; the loser inserts nothing.
        let inserted = sqlx::query(
            "INSERT INTO processed_events (event_id) VALUES ($1) ON CONFLICT (event_id) DO NOTHING",
        )
        .bind(&purchase.event_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            tx.rollback().await?;
            return Ok(ApplyOutcome::Duplicate);
        }

        sqlx::query(
            r"
            INSERT INTO purchases (id, event_id, line_id, group_id, plan, checkout_session_id, customer_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ",
        )
        .bind(Uuid::new_v4())
        .bind(&purchase.event_id)
        .bind(&purchase.line_id)
        .bind(&purchase.group_id)
        .bind(purchase.plan.as_str())
        .bind(&purchase.checkout_session_id)
        .bind(&purchase.customer_id)
        .bind(purchase.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
            INSERT INTO users (line_id, group_id, plan, quota, group_limit, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (line_id, group_id) DO UPDATE
            SET plan = EXCLUDED.plan,
                quota = EXCLUDED.quota,
                group_limit = EXCLUDED.group_limit,
                updated_at = EXCLUDED.updated_at
            ",
        )
        .bind(&quota.line_id)
        .bind(&quota.group_id)
        .bind(quota.plan.as_str())
        .bind(quota.quota)
        .bind(quota.group_limit)
        .bind(quota.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(ApplyOutcome::Applied)
    }

    async fn quota(&self, line_id: &str, group_id: &str) -> Result<Option<QuotaState>> {
        sqlx::query_as::<_, QuotaRow>(
            r"
            SELECT line_id, group_id, plan, quota, group_limit, updated_at
            FROM users
            WHERE line_id = $1 AND group_id = $2
            ",
        )
        .bind(line_id)
        .bind(group_id)
        .fetch_optional(&self.pool)
        .await?
        .map(QuotaState::try_from)
        .transpose()
    }

    async fn purchases(&self, line_id: &str, group_id: &str) -> Result<Vec<PurchaseRecord>> {
        sqlx::query_as::<_, PurchaseRow>(
            r"
            SELECT event_id, line_id, group_id, plan, checkout_session_id, customer_id, created_at
            FROM purchases
            WHERE line_id = $1 AND group_id = $2
            ORDER BY created_at
            ",
        )
        .bind(line_id)
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(PurchaseRecord::try_from)
        .collect()
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
