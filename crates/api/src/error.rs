//! API error types and handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use atelier_billing::BillingError;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Insufficient credits: {0}")]
    InsufficientCredits(String),

    #[error("Refill limit reached: {0}")]
    RefillLimitReached(String),

    #[error("Billing provider error: {0}")]
    Provider(String),

    #[error("Billing provider timed out, please try again")]
    ProviderTimeout,

    #[error("Resource not found")]
    NotFound,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error")]
    Internal,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::InsufficientCredits(_) => StatusCode::PAYMENT_REQUIRED,
            ApiError::RefillLimitReached(_) => StatusCode::BAD_REQUEST,
            ApiError::Provider(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ProviderTimeout => StatusCode::GATEWAY_TIMEOUT,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Internal details stay in the logs, not the response body
        let message = match &self {
            ApiError::Database(_) => "Database error".to_string(),
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::InvalidPlan(msg) => ApiError::InvalidRequest(msg),
            BillingError::InvalidPack(msg) => {
                ApiError::InvalidRequest(format!("unknown credit pack: {}", msg))
            }
            BillingError::InvalidAmount(msg) => ApiError::InvalidRequest(msg),
            BillingError::InsufficientCredits { required, available } => {
                ApiError::InsufficientCredits(format!(
                    "{} required, {} available",
                    required, available
                ))
            }
            BillingError::RefillLimitReached { used, limit } => {
                ApiError::RefillLimitReached(format!("{} of {} this cycle", used, limit))
            }
            BillingError::ProviderTimeout => ApiError::ProviderTimeout,
            BillingError::ProviderApi(msg) => ApiError::Provider(msg),
            BillingError::WebhookSignatureInvalid => {
                ApiError::InvalidRequest("webhook signature verification failed".to_string())
            }
            BillingError::WebhookPayloadInvalid(msg) => ApiError::InvalidRequest(msg),
            BillingError::UnknownUser(_) => ApiError::NotFound,
            BillingError::Database(msg) => ApiError::Database(msg),
            BillingError::Config(_) => ApiError::Internal,
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!(error = %err, "Database error");
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound,
            _ => ApiError::Database(err.to_string()),
        }
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_status_mapping_follows_taxonomy() {
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::InvalidRequest("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::InsufficientCredits("x".into()).status(),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            ApiError::RefillLimitReached("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Provider("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(ApiError::ProviderTimeout.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_billing_error_conversion() {
        let err: ApiError = BillingError::InsufficientCredits {
            required: 10,
            available: 4,
        }
        .into();
        assert!(matches!(err, ApiError::InsufficientCredits(_)));

        let err: ApiError = BillingError::RefillLimitReached { used: 3, limit: 3 }.into();
        assert!(matches!(err, ApiError::RefillLimitReached(_)));

        let err: ApiError = BillingError::InvalidPlan("enterprise".into()).into();
        assert!(matches!(err, ApiError::InvalidRequest(_)));

        let err: ApiError = BillingError::ProviderTimeout.into();
        assert!(matches!(err, ApiError::ProviderTimeout));

        let err: ApiError = BillingError::UnknownUser(Uuid::new_v4()).into();
        assert!(matches!(err, ApiError::NotFound));
    }
}
