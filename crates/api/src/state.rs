//! Shared application state

use std::sync::Arc;

use sqlx::PgPool;

use atelier_billing::{
    CheckoutService, CreditLedger, CustomerService, StripeClient, SubscriptionReconciler,
    WebhookService,
};

use crate::config::Config;

/// State shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub stripe: StripeClient,
    pub ledger: CreditLedger,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config, stripe: StripeClient) -> Self {
        let ledger = CreditLedger::new(pool.clone());
        Self {
            pool,
            config: Arc::new(config),
            stripe,
            ledger,
        }
    }

    pub fn reconciler(&self) -> SubscriptionReconciler {
        SubscriptionReconciler::new(self.stripe.clone(), self.pool.clone())
    }

    pub fn checkout(&self) -> CheckoutService {
        CheckoutService::new(self.stripe.clone(), self.pool.clone())
    }

    pub fn customers(&self) -> CustomerService {
        CustomerService::new(self.stripe.clone(), self.pool.clone())
    }

    pub fn webhooks(&self) -> WebhookService {
        WebhookService::new(self.pool.clone())
    }
}
