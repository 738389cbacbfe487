//! Billing routes for Stripe integration

use axum::{
    extract::{Extension, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use atelier_billing::verify_signature;
use atelier_shared::SubscriptionSummary;

use crate::{auth::AuthUser, error::ApiError, state::AppState};

/// Request to create a subscription checkout session
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCheckoutRequest {
    pub plan: String,
    pub billing_cycle: String,
}

/// Request to purchase a credit pack
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseCreditsRequest {
    pub pack_id: String,
}

/// Redirect URL for a created checkout session
#[derive(Debug, Serialize)]
pub struct CheckoutUrlResponse {
    pub url: String,
}

/// Reconcile the caller's subscription against Stripe and return the result
pub async fn check_subscription(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> Result<Json<SubscriptionSummary>, ApiError> {
    let summary = state
        .reconciler()
        .reconcile(auth_user.user_id, &auth_user.email)
        .await
        .map_err(|e| {
            tracing::error!(
                step = "check-subscription",
                user_id = %auth_user.user_id,
                error = %e,
                "Subscription reconciliation failed"
            );
            ApiError::from(e)
        })?;

    Ok(Json(summary))
}

/// Create a checkout session for a purchasable plan
pub async fn create_checkout(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<CreateCheckoutRequest>,
) -> Result<Json<CheckoutUrlResponse>, ApiError> {
    let session = state
        .checkout()
        .create_plan_checkout(
            auth_user.user_id,
            &auth_user.email,
            &req.plan,
            &req.billing_cycle,
        )
        .await
        .map_err(|e| {
            tracing::error!(
                step = "create-checkout",
                user_id = %auth_user.user_id,
                plan = %req.plan,
                error = %e,
                "Checkout creation failed"
            );
            ApiError::from(e)
        })?;

    let url = session
        .url
        .ok_or_else(|| ApiError::Provider("checkout session has no redirect URL".to_string()))?;

    Ok(Json(CheckoutUrlResponse { url }))
}

/// Create a payment session for a credit pack refill
pub async fn purchase_credits(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<PurchaseCreditsRequest>,
) -> Result<Json<CheckoutUrlResponse>, ApiError> {
    let session = state
        .checkout()
        .create_pack_checkout(auth_user.user_id, &auth_user.email, &req.pack_id)
        .await
        .map_err(|e| {
            tracing::error!(
                step = "purchase-credits",
                user_id = %auth_user.user_id,
                pack_id = %req.pack_id,
                error = %e,
                "Credit pack purchase failed"
            );
            ApiError::from(e)
        })?;

    let url = session
        .url
        .ok_or_else(|| ApiError::Provider("checkout session has no redirect URL".to_string()))?;

    Ok(Json(CheckoutUrlResponse { url }))
}

/// Stripe webhook endpoint (public; authenticated by signature)
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<StatusCode, ApiError> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::InvalidRequest("missing stripe-signature header".to_string()))?;

    verify_signature(
        &body,
        signature,
        &state.stripe.config().webhook_secret,
        OffsetDateTime::now_utc().unix_timestamp(),
    )
    .map_err(|e| {
        tracing::warn!(step = "webhook-verify", error = %e, "Webhook rejected");
        ApiError::from(e)
    })?;

    state.webhooks().handle_event(&body).await.map_err(|e| {
        tracing::error!(step = "webhook-apply", error = %e, "Webhook application failed");
        ApiError::from(e)
    })?;

    Ok(StatusCode::OK)
}
