//! Stripe customer management

use sqlx::PgPool;
use stripe::{CreateCustomer, Customer, CustomerId, ListCustomers};
use uuid::Uuid;

use crate::client::{with_timeout, StripeClient};
use crate::error::{BillingError, BillingResult};

/// Customer service for resolving and creating Stripe customers
pub struct CustomerService {
    stripe: StripeClient,
    pool: PgPool,
}

impl CustomerService {
    pub fn new(stripe: StripeClient, pool: PgPool) -> Self {
        Self { stripe, pool }
    }

    /// Find the Stripe customer for an account email, if any
    pub async fn find_by_email(&self, email: &str) -> BillingResult<Option<Customer>> {
        let params = ListCustomers {
            email: Some(email),
            limit: Some(1),
            ..Default::default()
        };

        let customers = with_timeout(Customer::list(self.stripe.inner(), &params)).await?;
        Ok(customers.data.into_iter().next())
    }

    /// Create or get the Stripe customer for a user
    ///
    /// The customer is created lazily on first checkout: reuse the stored
    /// id when present, fall back to an email lookup, and only then create
    /// a fresh customer carrying the user id as metadata.
    pub async fn get_or_create(&self, user_id: Uuid, email: &str) -> BillingResult<Customer> {
        let existing: Option<(Option<String>,)> =
            sqlx::query_as("SELECT stripe_customer_id FROM user_credits WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        if let Some((Some(customer_id),)) = existing {
            let customer_id = customer_id
                .parse::<CustomerId>()
                .map_err(|e| BillingError::ProviderApi(format!("Invalid customer ID: {}", e)))?;

            let customer =
                with_timeout(Customer::retrieve(self.stripe.inner(), &customer_id, &[])).await?;
            return Ok(customer);
        }

        if let Some(customer) = self.find_by_email(email).await? {
            self.persist_customer_id(user_id, customer.id.as_str()).await?;
            return Ok(customer);
        }

        let mut metadata = std::collections::HashMap::new();
        metadata.insert("user_id".to_string(), user_id.to_string());
        metadata.insert("platform".to_string(), "atelier".to_string());

        let params = CreateCustomer {
            email: Some(email),
            metadata: Some(metadata),
            ..Default::default()
        };

        let customer = with_timeout(Customer::create(self.stripe.inner(), params)).await?;

        self.persist_customer_id(user_id, customer.id.as_str()).await?;

        tracing::info!(
            user_id = %user_id,
            customer_id = %customer.id,
            "Created Stripe customer"
        );

        Ok(customer)
    }

    /// Store the customer id on the user's credit record for future checkouts
    pub async fn persist_customer_id(&self, user_id: Uuid, customer_id: &str) -> BillingResult<()> {
        sqlx::query(
            r#"
            INSERT INTO user_credits (user_id, stripe_customer_id)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE
            SET stripe_customer_id = EXCLUDED.stripe_customer_id, updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(customer_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
