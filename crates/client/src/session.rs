//! Session-owned subscription state
//!
//! One `SubscriptionSession` exists per authenticated UI session: it is
//! constructed at login, handed to the views that need it, and torn down at
//! logout. There is no ambient singleton. The background poller dies with
//! the session, so no orphaned polling outlives the identity it refreshes.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::task::JoinHandle;
use url::Url;

use atelier_shared::SubscriptionSummary;

use crate::api::{ApiClient, ApiClientError};
use crate::redirect::{strip_checkout_markers, CheckoutOutcome};

/// Fixed interval between background subscription refreshes
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Whether the cached state permits another credit pack purchase this cycle
pub fn summary_can_refill(summary: &SubscriptionSummary) -> bool {
    summary.subscribed
        && summary.plan.is_paid()
        && summary.refills_this_month < summary.plan.max_refills_per_month()
}

/// Whether the cached balance covers a cost
pub fn summary_has_credits_for(summary: &SubscriptionSummary, cost: i32) -> bool {
    summary.credit_balance >= cost
}

/// Cached subscription state for one authenticated session
pub struct SubscriptionSession {
    client: ApiClient,
    state: Arc<RwLock<Option<SubscriptionSummary>>>,
    poller: Option<JoinHandle<()>>,
}

impl SubscriptionSession {
    /// Start a session: refreshes immediately, then on a fixed interval
    /// until the session is dropped or shut down
    pub fn start(client: ApiClient) -> Self {
        let state: Arc<RwLock<Option<SubscriptionSummary>>> = Arc::new(RwLock::new(None));

        let poller_client = client.clone();
        let poller_state = Arc::clone(&state);
        let poller = tokio::spawn(async move {
            let mut interval = tokio::time::interval(REFRESH_INTERVAL);
            loop {
                interval.tick().await;
                match poller_client.check_subscription().await {
                    Ok(summary) => {
                        if let Ok(mut slot) = poller_state.write() {
                            *slot = Some(summary);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Background subscription refresh failed");
                    }
                }
            }
        });

        Self {
            client,
            state,
            poller: Some(poller),
        }
    }

    /// Force a refresh and update the cache
    pub async fn refresh(&self) -> Result<SubscriptionSummary, ApiClientError> {
        let summary = self.client.check_subscription().await?;
        if let Ok(mut slot) = self.state.write() {
            *slot = Some(summary.clone());
        }
        Ok(summary)
    }

    /// Handle a return-from-checkout redirect: strips the success marker and
    /// refreshes immediately when one was present. Returns the cleaned URL
    /// (for the visible location) and the outcome to notify about.
    pub async fn on_return_from_checkout(&self, url: &Url) -> (Url, Option<CheckoutOutcome>) {
        let (cleaned, outcome) = strip_checkout_markers(url);
        if outcome.is_some() {
            if let Err(e) = self.refresh().await {
                tracing::warn!(error = %e, "Post-checkout refresh failed");
            }
        }
        (cleaned, outcome)
    }

    /// Last known subscription state, if any refresh has completed
    pub fn current(&self) -> Option<SubscriptionSummary> {
        self.state.read().ok().and_then(|slot| slot.clone())
    }

    /// True iff the cached state permits another refill purchase
    pub fn can_refill(&self) -> bool {
        self.current()
            .map(|summary| summary_can_refill(&summary))
            .unwrap_or(false)
    }

    /// True iff the cached balance covers `cost`
    pub fn has_credits_for(&self, cost: i32) -> bool {
        self.current()
            .map(|summary| summary_has_credits_for(&summary, cost))
            .unwrap_or(false)
    }

    /// Tear the session down, cancelling the background poller
    pub fn shutdown(mut self) {
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
    }
}

impl Drop for SubscriptionSession {
    fn drop(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
    }
}
