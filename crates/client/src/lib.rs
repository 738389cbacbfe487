//! Atelier Client
//!
//! UI-session state for the credit/subscription platform: a typed API
//! client, a session-owned subscription cache with derived predicates and a
//! background refresh poller, and return-from-checkout marker handling.

pub mod api;
pub mod redirect;
pub mod session;

pub use api::{ApiClient, ApiClientError};
pub use redirect::{strip_checkout_markers, CheckoutOutcome};
pub use session::{
    summary_can_refill, summary_has_credits_for, SubscriptionSession, REFRESH_INTERVAL,
};
