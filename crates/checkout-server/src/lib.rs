//! plan-checkout HTTP server
//!
//! Axum router exposing checkout, webhook, billing portal and storefront
//! config endpoints over [`checkout_payments`].

pub mod config;
pub mod handlers;
pub mod state;

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    routing::{get, post},
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers::{
    create_checkout_session, customer_portal, get_config, health_check, stripe_webhook,
};
pub use crate::config::ServerConfig;
pub use crate::state::AppState;

/// Build the application router.
///
/// Cross-origin requests are allowed only from `allowed_origins`.
pub fn app(state: AppState, allowed_origins: Vec<HeaderValue>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true);

    Router::new()
        .route("/health", get(health_check))
        .route("/config", get(get_config))
        .route("/create-checkout-session", post(create_checkout_session))
        .route("/customer-portal", post(customer_portal))
        .route("/webhook", post(stripe_webhook))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
