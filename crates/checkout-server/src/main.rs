//! plan-checkout server binary

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use checkout_payments::{MemoryQuotaStore, PaymentsConfig, PgQuotaStore, QuotaStore, StripeClient};
use checkout_server::{AppState, ServerConfig, app};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    let payments = PaymentsConfig::from_env().context("loading payments configuration")?;
    let server = ServerConfig::from_env().context("loading server configuration")?;

    if payments.webhook.is_unverified() {
        tracing::warn!("══════════════════════════════════════════════════");
        tracing::warn!("⚠ Webhook signatures are NOT verified");
        tracing::warn!("  ALLOW_UNVERIFIED_WEBHOOKS=true and no STRIPE_WEBHOOK_SECRET");
        tracing::warn!("  Anyone can grant quota by posting to /webhook");
        tracing::warn!("══════════════════════════════════════════════════");
    }

    let prices = payments.catalog.prices();
    if prices.is_empty() {
        tracing::warn!("⚠ No PRICE_ID_* configured - every checkout will be rejected");
    } else {
        for (plan, price) in &prices {
            tracing::info!("  Plan {} → {}", plan, price);
        }
    }

    // Storage
    let store: Arc<dyn QuotaStore> = match &server.database_url {
        Some(url) => {
            let store = PgQuotaStore::connect(url, server.database_max_connections)
                .await
                .context("connecting to PostgreSQL")?;
            store.run_migrations().await.context("running migrations")?;
            tracing::info!("✓ PostgreSQL quota store ready");
            Arc::new(store)
        }
        None => {
            tracing::warn!("⚠ DATABASE_URL not set - quota is kept in memory and lost on restart");
            Arc::new(MemoryQuotaStore::new())
        }
    };

    let provider = Arc::new(StripeClient::from_config(&payments));
    tracing::info!("✓ Stripe configured");

    let state = AppState::new(payments, provider, store, server.reconcile_timeout);
    let router = app(state, server.cors_allowed_origins.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], server.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("🚀 plan-checkout listening on http://{}", addr);
    tracing::info!("Endpoints:");
    tracing::info!("  POST /create-checkout-session - Start Stripe checkout");
    tracing::info!("  POST /webhook                 - Stripe webhook");
    tracing::info!("  POST /customer-portal         - Billing portal redirect");
    tracing::info!("  GET  /config                  - Publishable key and prices");
    tracing::info!("  GET  /health                  - Health check");

    axum::serve(listener, router).await?;

    Ok(())
}
