use axum::{
    http::{HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowHeaders, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ServerConfig;
use crate::handlers;
use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    let agents = Router::new()
        .route("/evaluate", post(handlers::evaluate))
        .route("/health", get(handlers::agents_health));

    Router::new()
        .route("/api/health", get(handlers::health_check))
        .nest("/api/agents", agents)
        .fallback(handlers::not_found)
        .layer(cors_layer(&state.config.server))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// A configured origin gets an exact-match policy with credentials;
/// otherwise anything goes.
fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let origin = server
        .cors_origin
        .as_deref()
        .and_then(|origin| HeaderValue::from_str(origin).ok());

    match origin {
        Some(origin) => {
            info!("CORS restricted to {:?}", origin);
            CorsLayer::new()
                .allow_origin(origin)
                .allow_credentials(true)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers(AllowHeaders::mirror_request())
        }
        None => CorsLayer::permissive(),
    }
}
