//! Typed HTTP client for the Atelier API

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use atelier_shared::{BalanceSnapshot, CreditTransaction, SubscriptionSummary};

/// Request timeout for API calls
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ApiClientError {
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
}

/// Error body returned by the API on failure
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateCheckoutRequest<'a> {
    plan: &'a str,
    billing_cycle: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PurchaseCreditsRequest<'a> {
    pack_id: &'a str,
}

#[derive(Debug, Serialize)]
struct DeductRequest<'a> {
    amount: i32,
    description: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct CheckoutUrlResponse {
    url: String,
}

/// Authenticated API client for one user session
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    bearer_token: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, bearer_token: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bearer_token: bearer_token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    async fn handle<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }
        let message = response
            .json::<ErrorBody>()
            .await
            .map(|body| body.error)
            .unwrap_or_else(|_| status.to_string());
        Err(ApiClientError::Api {
            status: status.as_u16(),
            message,
        })
    }

    /// Reconcile and fetch the current subscription state
    pub async fn check_subscription(&self) -> Result<SubscriptionSummary, ApiClientError> {
        let response = self
            .http
            .get(self.url("/billing/subscription"))
            .bearer_auth(&self.bearer_token)
            .send()
            .await?;
        Self::handle(response).await
    }

    /// Start a plan checkout; returns the provider redirect URL
    pub async fn create_checkout(
        &self,
        plan: &str,
        billing_cycle: &str,
    ) -> Result<String, ApiClientError> {
        let response = self
            .http
            .post(self.url("/billing/checkout"))
            .bearer_auth(&self.bearer_token)
            .json(&CreateCheckoutRequest {
                plan,
                billing_cycle,
            })
            .send()
            .await?;
        let body: CheckoutUrlResponse = Self::handle(response).await?;
        Ok(body.url)
    }

    /// Start a credit pack purchase; returns the provider redirect URL
    pub async fn purchase_credits(&self, pack_id: &str) -> Result<String, ApiClientError> {
        let response = self
            .http
            .post(self.url("/billing/purchase-credits"))
            .bearer_auth(&self.bearer_token)
            .json(&PurchaseCreditsRequest { pack_id })
            .send()
            .await?;
        let body: CheckoutUrlResponse = Self::handle(response).await?;
        Ok(body.url)
    }

    /// Current balance snapshot
    pub async fn credits(&self) -> Result<BalanceSnapshot, ApiClientError> {
        let response = self
            .http
            .get(self.url("/credits"))
            .bearer_auth(&self.bearer_token)
            .send()
            .await?;
        Self::handle(response).await
    }

    /// Recent ledger transactions
    pub async fn transactions(&self) -> Result<Vec<CreditTransaction>, ApiClientError> {
        let response = self
            .http
            .get(self.url("/credits/transactions"))
            .bearer_auth(&self.bearer_token)
            .send()
            .await?;
        Self::handle(response).await
    }

    /// Deduct credits for a research action
    pub async fn deduct(
        &self,
        amount: i32,
        description: Option<&str>,
    ) -> Result<BalanceSnapshot, ApiClientError> {
        let response = self
            .http
            .post(self.url("/credits/deduct"))
            .bearer_auth(&self.bearer_token)
            .json(&DeductRequest {
                amount,
                description,
            })
            .send()
            .await?;
        Self::handle(response).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_check_subscription_parses_summary() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/billing/subscription")
            .match_header("authorization", "Bearer token-123")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "subscribed": true,
                    "plan": "pro",
                    "billingCycle": "monthly",
                    "subscriptionEnd": "2026-09-01T00:00:00Z",
                    "monthlyCredits": 700,
                    "extraCredits": 100,
                    "creditBalance": 560,
                    "refillsThisMonth": 1
                }"#,
            )
            .create_async()
            .await;

        let client = ApiClient::new(server.url(), "token-123");
        let summary = client.check_subscription().await.unwrap();

        assert!(summary.subscribed);
        assert_eq!(summary.plan, atelier_shared::Plan::Pro);
        assert_eq!(summary.credit_balance, 560);
        assert_eq!(summary.refills_this_month, 1);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_api_error_body_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v1/billing/purchase-credits")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":"Refill limit reached: 3 of 3 this cycle"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(server.url(), "token-123");
        let err = client.purchase_credits("small").await.unwrap_err();

        match err {
            ApiClientError::Api { status, message } => {
                assert_eq!(status, 400);
                assert!(message.contains("Refill limit reached"));
            }
            other => panic!("expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_checkout_returns_redirect_url() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v1/billing/checkout")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"url":"https://checkout.stripe.com/c/pay/cs_test_123"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(server.url(), "token-123");
        let url = client.create_checkout("pro", "monthly").await.unwrap();
        assert!(url.starts_with("https://checkout.stripe.com/"));
    }
}
