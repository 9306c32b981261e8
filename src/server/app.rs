use axum::Router;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

use crate::api::api_routes;

use super::AppState;

pub fn create_app(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let body_limit = RequestBodyLimitLayer::new(state.settings.server.body_limit_bytes);

    api_routes()
        // Add middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(body_limit)
        // Add state
        .with_state(state)
}
