//! HTTP Handlers

use axum::{
    Form, Json,
    body::Bytes,
    extract::{FromRequest, Request, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use checkout_payments::{
    CheckoutRequest, PaymentError, SIGNATURE_HEADER, WebhookOutcome, open_billing_portal,
    start_checkout,
};

use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub store: &'static str,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckoutResponse {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct PortalRequest {
    #[serde(rename = "sessionId", default)]
    pub session_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigResponse {
    pub publishable_key: String,
    pub prices: BTreeMap<String, String>,
}

/// Error returned from handlers, rendered as `{"error": {"message", "code"}}`
#[derive(Debug)]
pub struct ApiError(pub PaymentError);

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(PaymentError::InvalidRequest(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        } else {
            tracing::warn!(error = %self.0, "Request rejected");
        }

        let body = ErrorResponse {
            error: ErrorBody {
                message: self.0.user_message(),
                code: self.0.code().into(),
            },
        };
        (status, Json(body)).into_response()
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Response {
    let healthy = state.store.health_check().await.is_ok();
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthResponse {
            status: if healthy { "healthy" } else { "degraded" },
            version: env!("CARGO_PKG_VERSION"),
            store: state.store.backend(),
        }),
    )
        .into_response()
}

/// Publishable key and configured plan prices for the storefront
pub async fn get_config(State(state): State<AppState>) -> Json<ConfigResponse> {
    Json(ConfigResponse {
        publishable_key: state.config.publishable_key.clone(),
        prices: state
            .config
            .catalog
            .prices()
            .into_iter()
            .map(|(plan, price)| (plan.to_string(), price.to_string()))
            .collect(),
    })
}

/// Create Stripe checkout session
pub async fn create_checkout_session(
    State(state): State<AppState>,
    payload: Result<Json<CheckoutRequest>, JsonRejection>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let Json(request) = payload?;
    let session = start_checkout(state.provider.as_ref(), &state.config, &request).await?;

    Ok(Json(CheckoutResponse { url: session.url }))
}

/// Redirect to the Stripe billing portal.
///
/// Accepts `sessionId` as JSON or as a posted form field.
pub async fn customer_portal(
    State(state): State<AppState>,
    request: Request,
) -> Result<Redirect, ApiError> {
    let is_form = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/x-www-form-urlencoded"));

    let payload = if is_form {
        Form::<PortalRequest>::from_request(request, &state)
            .await
            .map(|Form(payload)| payload)
            .map_err(|e| PaymentError::InvalidRequest(e.body_text()))?
    } else {
        Json::<PortalRequest>::from_request(request, &state)
            .await
            .map(|Json(payload)| payload)?
    };

    let session =
        open_billing_portal(state.provider.as_ref(), &state.config, &payload.session_id).await?;

    Ok(Redirect::to(&session.url))
}

/// Stripe webhook handler
///
/// The body is taken as raw bytes so the signature is checked over exactly
/// what Stripe sent.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());

    let outcome = state.webhooks.process(&body, signature).await?;

    match &outcome {
        WebhookOutcome::Reconciled(quota) => tracing::debug!(
            line_id = %quota.line_id,
            group_id = %quota.group_id,
            "Webhook reconciled"
        ),
        WebhookOutcome::Duplicate => tracing::debug!("Webhook was a redelivery"),
        WebhookOutcome::Ignored { event_type } => {
            tracing::debug!(event_type = %event_type, "Webhook ignored");
        }
        WebhookOutcome::Rejected { reason } => {
            tracing::warn!(reason = %reason, "Webhook acknowledged without changes");
        }
    }

    Ok(StatusCode::OK)
}
