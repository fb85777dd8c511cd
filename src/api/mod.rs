pub mod error;
mod proxy;

use axum::{http::Method, routing::get, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::AppState;
use error::ApiError;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Browser dashboards call the proxy from other origins
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers(Any);

    Router::new()
        .route(
            "/health",
            get(health_check).fallback(proxy::method_not_allowed),
        )
        .route(
            "/api/getCampaigns",
            get(proxy::get_campaigns).fallback(proxy::method_not_allowed),
        )
        .route(
            "/api/getCampaignCommonStats",
            get(proxy::get_campaign_common_stats).fallback(proxy::method_not_allowed),
        )
        .fallback(not_found)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn not_found() -> ApiError {
    ApiError::not_found("Not found")
}
