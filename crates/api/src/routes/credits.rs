//! Credit ledger routes
//!
//! The deduct endpoint is the billing path for research tasks: the task
//! pipeline reserves credits here before dispatching work to the research
//! backend.

use axum::{
    extract::{Extension, Query, State},
    Json,
};
use serde::Deserialize;

use atelier_shared::{BalanceSnapshot, CreditTransaction};

use crate::{auth::AuthUser, error::ApiError, state::AppState};

/// Current balance snapshot
pub async fn get_credits(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> Result<Json<BalanceSnapshot>, ApiError> {
    let snapshot = state.ledger.balance(auth_user.user_id).await?;
    Ok(Json(snapshot))
}

#[derive(Debug, Deserialize)]
pub struct TransactionsQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

/// Recent ledger transactions, newest first
pub async fn list_transactions(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<TransactionsQuery>,
) -> Result<Json<Vec<CreditTransaction>>, ApiError> {
    let transactions = state
        .ledger
        .transactions(auth_user.user_id, query.limit)
        .await?;
    Ok(Json(transactions))
}

/// Request to deduct credits for usage
#[derive(Debug, Deserialize)]
pub struct DeductRequest {
    pub amount: i32,
    pub description: Option<String>,
}

/// Deduct credits for a research action
pub async fn deduct(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<DeductRequest>,
) -> Result<Json<BalanceSnapshot>, ApiError> {
    let snapshot = state
        .ledger
        .deduct(auth_user.user_id, req.amount, req.description.as_deref())
        .await
        .map_err(|e| {
            tracing::warn!(
                step = "deduct-credits",
                user_id = %auth_user.user_id,
                amount = req.amount,
                error = %e,
                "Credit deduction refused"
            );
            ApiError::from(e)
        })?;
    Ok(Json(snapshot))
}
