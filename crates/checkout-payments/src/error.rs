//! Payment Error Types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Payment-related errors
#[derive(Error, Debug)]
pub enum PaymentError {
    /// Plan unknown to the catalog, or known but without a price
    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    /// Client request is malformed or missing required fields
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Webhook signature verification failed
    #[error("Webhook signature invalid: {0}")]
    SignatureInvalid(String),

    /// Webhook payload parsing failed
    #[error("Webhook parse error: {0}")]
    WebhookParse(String),

    /// Stripe API error
    #[error("Payment provider error: {0}")]
    PaymentProvider(String),

    /// Checkout session unknown to Stripe or not tied to a customer
    #[error("Checkout session not found: {0}")]
    SessionNotFound(String),

    /// Storage error
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Operation exceeded its time bound
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PaymentError {
    /// Whether the provider should redeliver a webhook that failed with this error.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Persistence(_) | Self::Timeout(_))
    }

    /// HTTP status code this error maps to.
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::InvalidPlan(_)
            | Self::InvalidRequest(_)
            | Self::SignatureInvalid(_)
            | Self::WebhookParse(_)
            | Self::PaymentProvider(_) => 400,
            Self::SessionNotFound(_) => 404,
            Self::Persistence(_) | Self::Timeout(_) | Self::Config(_) => 500,
        }
    }

    /// Stable machine-readable code
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidPlan(_) => "INVALID_PLAN",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::SignatureInvalid(_) => "INVALID_SIGNATURE",
            Self::WebhookParse(_) => "WEBHOOK_PARSE",
            Self::PaymentProvider(_) => "PAYMENT_PROVIDER_ERROR",
            Self::SessionNotFound(_) => "SESSION_NOT_FOUND",
            Self::Persistence(_) => "PERSISTENCE_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Get user-facing message
    ///
    /// Provider failures pass Stripe's own message through, the way the
    /// hosted checkout flow reports card or price problems to the buyer.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidPlan(_) => "Invalid or missing plan parameter.".into(),
            Self::InvalidRequest(msg) | Self::PaymentProvider(msg) => msg.clone(),
            Self::SignatureInvalid(_) => "Invalid signature.".into(),
            Self::WebhookParse(_) => "Malformed webhook event.".into(),
            Self::SessionNotFound(_) => "Checkout session not found.".into(),
            Self::Persistence(_) | Self::Timeout(_) => {
                "Webhook processing failed. It will be retried.".into()
            }
            Self::Config(_) => "Service configuration error.".into(),
        }
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for PaymentError {
    fn from(err: sqlx::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}
