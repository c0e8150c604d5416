use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
    middleware::from_fn_with_state,
    routing::{get, post},
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{convert_handler, health_handler, metrics_handler};
use crate::middleware::{api_admission, convert_admission};
use crate::state::AppState;

// Room for multipart boundaries and headers on top of the file itself
const MULTIPART_OVERHEAD: u64 = 1024 * 1024;

/// Build the full router: `/api/health`, `/api/convert/ppt-to-pdf`, `/metrics`.
pub fn build_router(state: Arc<AppState>) -> Router {
    let body_limit = (state.settings.max_upload_bytes + MULTIPART_OVERHEAD) as usize;

    let convert = Router::new()
        .route("/ppt-to-pdf", post(convert_handler))
        .route_layer(from_fn_with_state(Arc::clone(&state), convert_admission))
        .layer(DefaultBodyLimit::max(body_limit));

    // API tier covers everything under /api except health
    let api = Router::new()
        .nest("/convert", convert)
        .route_layer(from_fn_with_state(Arc::clone(&state), api_admission))
        .route("/health", get(health_handler));

    let origins: Vec<HeaderValue> = state
        .settings
        .allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(Duration::from_secs(86400));

    Router::new()
        .nest("/api", api)
        .route("/metrics", get(metrics_handler))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::REFERRER_POLICY,
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
