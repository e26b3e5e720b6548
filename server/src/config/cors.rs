use axum::http::{header, HeaderName, HeaderValue, Method};
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};

pub const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000,http://localhost:5173";

const PREFLIGHT_MAX_AGE_SECS: u64 = 86400;

/// CORS for the booking frontend. `allowed_origins` is the comma separated
/// `CORS_ALLOWED_ORIGINS` value.
pub fn create_cors_layer(allowed_origins: &str) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(allow_origin(allowed_origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
            header::ORIGIN,
            HeaderName::from_static("x-requested-with"),
        ])
        .expose_headers([header::CONTENT_LENGTH, header::CONTENT_TYPE])
        .allow_credentials(true)
        .max_age(Duration::from_secs(PREFLIGHT_MAX_AGE_SECS))
}

fn parse_origins(allowed_origins: &str) -> Vec<HeaderValue> {
    allowed_origins
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => {
                tracing::debug!(origin, "CORS: allowing origin");
                Some(value)
            }
            Err(e) => {
                tracing::warn!(origin, error = %e, "CORS: invalid origin ignored");
                None
            }
        })
        .collect()
}

fn allow_origin(allowed_origins: &str) -> AllowOrigin {
    let origins = parse_origins(allowed_origins);
    if origins.is_empty() {
        // Credentials cannot be combined with a wildcard origin, so fall
        // back to the development defaults.
        tracing::warn!("CORS: no valid origins configured, using development defaults");
        return AllowOrigin::list(parse_origins(DEFAULT_ALLOWED_ORIGINS));
    }

    tracing::info!(count = origins.len(), "CORS: configured allowed origins");
    AllowOrigin::list(origins)
}
