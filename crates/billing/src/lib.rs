//! Atelier Billing
//!
//! Credit ledger, plan catalog, Stripe subscription reconciliation,
//! checkout/purchase initiators, and webhook application.

pub mod catalog;
pub mod checkout;
pub mod client;
pub mod customer;
pub mod error;
pub mod ledger;
pub mod reconcile;
pub mod webhook;

pub use catalog::{find_pack, price_for, resolve_price, CreditPack, PlanPrice, CREDIT_PACKS};
pub use checkout::{can_refill, validate_plan_request, CheckoutResponse, CheckoutService};
pub use client::{StripeClient, StripeConfig};
pub use customer::CustomerService;
pub use error::{BillingError, BillingResult};
pub use ledger::CreditLedger;
pub use reconcile::{resolve_active_price, SubscriptionReconciler};
pub use webhook::{verify_signature, WebhookService};
