//! Stripe Checkout sessions
//!
//! Initiators only: both flows validate, create a provider checkout session
//! carrying the user id as metadata for later webhook consumption, and
//! return the redirect URL. Neither touches the ledger — credits move when
//! the webhook confirms payment.

use sqlx::PgPool;
use stripe::{
    CheckoutSession, CheckoutSessionMode, CreateCheckoutSession, CreateCheckoutSessionLineItems,
    CreateCheckoutSessionLineItemsPriceData, CreateCheckoutSessionLineItemsPriceDataProductData,
    Currency, CustomerId,
};
use uuid::Uuid;

use atelier_shared::{BillingCycle, Plan};

use crate::catalog::{self, CreditPack};
use crate::client::{with_timeout, StripeClient};
use crate::customer::CustomerService;
use crate::error::{BillingError, BillingResult};

/// Parse and validate a plan/cycle checkout request
///
/// Only currently-sold plans pass; legacy and free plans are rejected even
/// though they exist in the catalog.
pub fn validate_plan_request(
    plan: &str,
    billing_cycle: &str,
) -> BillingResult<(Plan, BillingCycle, &'static str)> {
    let plan: Plan = plan
        .parse()
        .map_err(|_| BillingError::InvalidPlan(plan.to_string()))?;
    let cycle = BillingCycle::from_str(billing_cycle)
        .ok_or_else(|| BillingError::InvalidPlan(format!("unknown billing cycle: {}", billing_cycle)))?;
    let price_id = catalog::price_for(plan, cycle)
        .ok_or_else(|| BillingError::InvalidPlan(format!("{} is not purchasable", plan)))?;
    Ok((plan, cycle, price_id))
}

/// Whether a user may purchase a credit pack this cycle
pub fn can_refill(plan: Plan, subscribed: bool, refills_this_month: i32) -> bool {
    subscribed && plan.is_paid() && refills_this_month < plan.max_refills_per_month()
}

/// Checkout service for creating Stripe checkout sessions
pub struct CheckoutService {
    stripe: StripeClient,
    pool: PgPool,
}

impl CheckoutService {
    pub fn new(stripe: StripeClient, pool: PgPool) -> Self {
        Self { stripe, pool }
    }

    /// Create a subscription checkout session for a purchasable plan
    pub async fn create_plan_checkout(
        &self,
        user_id: Uuid,
        email: &str,
        plan: &str,
        billing_cycle: &str,
    ) -> BillingResult<CheckoutResponse> {
        let (plan, cycle, price_id) = validate_plan_request(plan, billing_cycle)?;

        let customers = CustomerService::new(self.stripe.clone(), self.pool.clone());
        let customer = customers.get_or_create(user_id, email).await?;
        let customer_id = parse_customer_id(customer.id.as_str())?;

        let base_url = &self.stripe.config().app_base_url;
        let success_url = format!("{}/profile?checkout=success", base_url);
        let cancel_url = format!("{}/pricing?checkout=canceled", base_url);

        let mut metadata = std::collections::HashMap::new();
        metadata.insert("user_id".to_string(), user_id.to_string());
        metadata.insert("plan".to_string(), plan.to_string());
        metadata.insert("billing_cycle".to_string(), cycle.as_str().to_string());
        metadata.insert(
            "monthly_credits".to_string(),
            plan.monthly_credits().to_string(),
        );

        let params = CreateCheckoutSession {
            customer: Some(customer_id),
            mode: Some(CheckoutSessionMode::Subscription),
            line_items: Some(vec![CreateCheckoutSessionLineItems {
                price: Some(price_id.to_string()),
                quantity: Some(1),
                ..Default::default()
            }]),
            success_url: Some(&success_url),
            cancel_url: Some(&cancel_url),
            metadata: Some(metadata),
            allow_promotion_codes: Some(true),
            ..Default::default()
        };

        let session = with_timeout(CheckoutSession::create(self.stripe.inner(), params)).await?;

        tracing::info!(
            user_id = %user_id,
            session_id = %session.id,
            plan = %plan,
            billing_cycle = %cycle,
            "Created plan checkout session"
        );

        Ok(session.into())
    }

    /// Create a payment checkout session for a credit pack refill
    ///
    /// The refill gate runs before pack validation: free-tier callers are
    /// rejected with `RefillLimitReached` no matter what pack they named.
    pub async fn create_pack_checkout(
        &self,
        user_id: Uuid,
        email: &str,
        pack_id: &str,
    ) -> BillingResult<CheckoutResponse> {
        let state: Option<(String, String, i32)> = sqlx::query_as(
            "SELECT subscription_plan, subscription_status, refills_this_month FROM user_credits WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let (plan, subscribed, refills) = match state {
            Some((plan, status, refills)) => {
                let plan: Plan = plan.parse().unwrap_or_default();
                (plan, status == "active", refills)
            }
            None => (Plan::Free, false, 0),
        };

        if !can_refill(plan, subscribed, refills) {
            return Err(BillingError::RefillLimitReached {
                used: refills,
                limit: plan.max_refills_per_month(),
            });
        }

        let pack = catalog::find_pack(pack_id)
            .ok_or_else(|| BillingError::InvalidPack(pack_id.to_string()))?;

        let customers = CustomerService::new(self.stripe.clone(), self.pool.clone());
        let customer = customers.get_or_create(user_id, email).await?;
        let customer_id = parse_customer_id(customer.id.as_str())?;

        let base_url = &self.stripe.config().app_base_url;
        let success_url = format!("{}/profile?credits=success", base_url);
        let cancel_url = format!("{}/profile?credits=canceled", base_url);

        let mut metadata = std::collections::HashMap::new();
        metadata.insert("user_id".to_string(), user_id.to_string());
        metadata.insert("pack_id".to_string(), pack.id.to_string());
        metadata.insert("credits".to_string(), pack.credits.to_string());

        let line_item = pack_line_item(pack);

        let params = CreateCheckoutSession {
            customer: Some(customer_id),
            mode: Some(CheckoutSessionMode::Payment),
            line_items: Some(vec![line_item]),
            success_url: Some(&success_url),
            cancel_url: Some(&cancel_url),
            metadata: Some(metadata),
            ..Default::default()
        };

        let session = with_timeout(CheckoutSession::create(self.stripe.inner(), params)).await?;

        tracing::info!(
            user_id = %user_id,
            session_id = %session.id,
            pack_id = %pack.id,
            credits = pack.credits,
            "Created credit pack checkout session"
        );

        Ok(session.into())
    }
}

fn parse_customer_id(raw: &str) -> BillingResult<CustomerId> {
    raw.parse::<CustomerId>()
        .map_err(|e| BillingError::ProviderApi(format!("Invalid customer ID: {}", e)))
}

/// Inline-priced line item for a credit pack (packs have no dashboard price)
fn pack_line_item(pack: &CreditPack) -> CreateCheckoutSessionLineItems {
    CreateCheckoutSessionLineItems {
        price_data: Some(CreateCheckoutSessionLineItemsPriceData {
            currency: Currency::USD,
            unit_amount: Some(pack.amount_cents),
            product_data: Some(CreateCheckoutSessionLineItemsPriceDataProductData {
                name: format!("Credit refill: {}", pack.label),
                ..Default::default()
            }),
            ..Default::default()
        }),
        quantity: Some(1),
        ..Default::default()
    }
}

/// Response for creating a checkout session
#[derive(Debug, serde::Serialize)]
pub struct CheckoutResponse {
    pub session_id: String,
    pub url: Option<String>,
}

impl From<CheckoutSession> for CheckoutResponse {
    fn from(session: CheckoutSession) -> Self {
        Self {
            session_id: session.id.to_string(),
            url: session.url,
        }
    }
}
