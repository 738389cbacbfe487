//! Billing error types

use thiserror::Error;
use uuid::Uuid;

/// Billing-specific errors
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Stripe API error: {0}")]
    ProviderApi(String),

    #[error("Billing provider call timed out")]
    ProviderTimeout,

    #[error("No credit record for user: {0}")]
    UnknownUser(Uuid),

    #[error("Insufficient credits: {required} required, {available} available")]
    InsufficientCredits { required: i32, available: i32 },

    #[error("Refill limit reached: {used} of {limit} this cycle")]
    RefillLimitReached { used: i32, limit: i32 },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid plan or billing cycle: {0}")]
    InvalidPlan(String),

    #[error("Unknown credit pack: {0}")]
    InvalidPack(String),

    #[error("Webhook signature verification failed")]
    WebhookSignatureInvalid,

    #[error("Webhook payload invalid: {0}")]
    WebhookPayloadInvalid(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl BillingError {
    /// Whether the caller may safely retry the operation
    /// Provider timeouts leave no partial state behind (the provider call
    /// happens before the single write each procedure performs)
    pub fn is_retryable(&self) -> bool {
        matches!(self, BillingError::ProviderTimeout)
    }
}

impl From<stripe::StripeError> for BillingError {
    fn from(err: stripe::StripeError) -> Self {
        BillingError::ProviderApi(err.to_string())
    }
}

impl From<sqlx::Error> for BillingError {
    fn from(err: sqlx::Error) -> Self {
        BillingError::Database(err.to_string())
    }
}

pub type BillingResult<T> = Result<T, BillingError>;
