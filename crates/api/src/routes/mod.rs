//! API routes

pub mod billing;
pub mod credits;
pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};

use crate::{auth::require_auth, cors::cors_layer, state::AppState};

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    // Stripe webhook (public, uses signature verification)
    let public_api_routes = Router::new().route("/billing/webhook", post(billing::webhook));

    // Protected API routes (auth required)
    let protected_api_routes = Router::new()
        .route("/billing/subscription", get(billing::check_subscription))
        .route("/billing/checkout", post(billing::create_checkout))
        .route("/billing/purchase-credits", post(billing::purchase_credits))
        .route("/credits", get(credits::get_credits))
        .route("/credits/transactions", get(credits::list_transactions))
        .route("/credits/deduct", post(credits::deduct))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let api_v1_routes = Router::new()
        .merge(public_api_routes)
        .merge(protected_api_routes);

    Router::new()
        .merge(health_routes)
        .nest("/api/v1", api_v1_routes)
        .layer(cors_layer(&state.config))
        // Request body cap; webhook payloads are small and so are ours
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .with_state(state)
}
