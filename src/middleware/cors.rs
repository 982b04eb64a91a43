use http::{
    header::{ACCEPT, CONTENT_TYPE},
    HeaderName, Method,
};
use tower_http::cors::{Any, CorsLayer};

use crate::config::AppConfig;

pub fn build_cors_layer(config: &AppConfig) -> CorsLayer {
    let headers = vec![ACCEPT, CONTENT_TYPE, HeaderName::from_static("x-request-id")];

    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(headers)
        .expose_headers([HeaderName::from_static("x-request-id")]);

    if config
        .cors_origins
        .iter()
        .any(|origin| origin.trim() == "*")
    {
        if config.is_production() {
            tracing::warn!("CORS allows any origin in production");
        }
        return layer.allow_origin(Any).allow_credentials(false);
    }

    let origins = config
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect::<Vec<_>>();
    if origins.is_empty() {
        tracing::warn!("CORS_ORIGINS has no valid origins; cross-origin requests will be refused");
    }
    layer.allow_origin(origins).allow_credentials(true)
}
