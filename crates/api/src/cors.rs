//! CORS allow-list
//!
//! Every endpoint echoes back an allowed caller origin from a fixed list,
//! plus wildcard preview-deployment subdomains, and supports preflight.

use axum::http::{header, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::config::Config;

/// Whether a request origin may call the API
///
/// Exact match against the allow-list, or an https origin whose host is a
/// proper subdomain of the preview suffix (`https://pr-42.<suffix>`).
pub fn origin_allowed(origin: &str, allowlist: &[String], preview_suffix: Option<&str>) -> bool {
    if allowlist.iter().any(|allowed| allowed == origin) {
        return true;
    }

    let Some(suffix) = preview_suffix else {
        return false;
    };
    let Some(host) = origin.strip_prefix("https://") else {
        return false;
    };
    // Require a subdomain label; the bare suffix belongs in the allow-list
    host.len() > suffix.len() + 1
        && host.ends_with(suffix)
        && host.as_bytes()[host.len() - suffix.len() - 1] == b'.'
        && !host.contains('/')
}

/// Build the CORS layer from config
pub fn cors_layer(config: &Config) -> CorsLayer {
    let allowlist = config.allowed_origins.clone();
    let preview_suffix = config.preview_origin_suffix.clone();

    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _| {
            origin
                .to_str()
                .map(|origin| origin_allowed(origin, &allowlist, preview_suffix.as_deref()))
                .unwrap_or(false)
        }))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}
