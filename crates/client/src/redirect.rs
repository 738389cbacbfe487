//! Return-from-checkout marker handling
//!
//! Stripe redirects back with `checkout=success` or `credits=success` in the
//! query string. The marker triggers an immediate subscription refresh and a
//! success notification, then must be stripped from the visible location so
//! a page reload does not re-trigger either.

use url::Url;

/// Outcome signalled by a return-from-checkout redirect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutOutcome {
    /// A plan subscription checkout completed
    CheckoutSuccess,
    /// A credit pack purchase completed
    CreditsSuccess,
}

/// Detect and remove checkout markers from a return URL
///
/// Returns the cleaned URL and the detected outcome, if any. Cancellation
/// markers are stripped too but signal no outcome. All unrelated query
/// parameters survive untouched.
pub fn strip_checkout_markers(url: &Url) -> (Url, Option<CheckoutOutcome>) {
    let mut outcome = None;
    let mut changed = false;

    let remaining: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, value)| match (key.as_ref(), value.as_ref()) {
            ("checkout", "success") => {
                outcome = Some(CheckoutOutcome::CheckoutSuccess);
                changed = true;
                false
            }
            ("credits", "success") => {
                outcome = Some(CheckoutOutcome::CreditsSuccess);
                changed = true;
                false
            }
            ("checkout", "canceled") | ("credits", "canceled") => {
                changed = true;
                false
            }
            _ => true,
        })
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if !changed {
        return (url.clone(), None);
    }

    let mut cleaned = url.clone();
    if remaining.is_empty() {
        cleaned.set_query(None);
    } else {
        cleaned
            .query_pairs_mut()
            .clear()
            .extend_pairs(remaining.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }

    (cleaned, outcome)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_checkout_success_detected_and_stripped() {
        let url = Url::parse("https://app.atelier-intel.com/profile?checkout=success").unwrap();
        let (cleaned, outcome) = strip_checkout_markers(&url);
        assert_eq!(outcome, Some(CheckoutOutcome::CheckoutSuccess));
        assert_eq!(cleaned.query(), None);
    }

    #[test]
    fn test_credits_success_detected_and_stripped() {
        let url = Url::parse("https://app.atelier-intel.com/profile?credits=success").unwrap();
        let (cleaned, outcome) = strip_checkout_markers(&url);
        assert_eq!(outcome, Some(CheckoutOutcome::CreditsSuccess));
        assert_eq!(cleaned.query(), None);
    }

    #[test]
    fn test_unrelated_params_survive() {
        let url =
            Url::parse("https://app.atelier-intel.com/profile?tab=usage&checkout=success").unwrap();
        let (cleaned, outcome) = strip_checkout_markers(&url);
        assert_eq!(outcome, Some(CheckoutOutcome::CheckoutSuccess));
        assert_eq!(cleaned.query(), Some("tab=usage"));
    }

    #[test]
    fn test_cancel_marker_stripped_without_outcome() {
        let url = Url::parse("https://app.atelier-intel.com/pricing?checkout=canceled").unwrap();
        let (cleaned, outcome) = strip_checkout_markers(&url);
        assert_eq!(outcome, None);
        assert_eq!(cleaned.query(), None);
    }

    #[test]
    fn test_plain_url_untouched() {
        let url = Url::parse("https://app.atelier-intel.com/profile?tab=usage").unwrap();
        let (cleaned, outcome) = strip_checkout_markers(&url);
        assert_eq!(outcome, None);
        assert_eq!(cleaned, url);
    }

    #[test]
    fn test_reload_after_strip_does_not_retrigger() {
        let url = Url::parse("https://app.atelier-intel.com/profile?checkout=success").unwrap();
        let (cleaned, _) = strip_checkout_markers(&url);
        // Reloading the cleaned URL must not produce an outcome again
        let (_, outcome) = strip_checkout_markers(&cleaned);
        assert_eq!(outcome, None);
    }
}
