pub mod attachments;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod lifecycle;
pub mod middleware;
pub mod pagination;
pub mod policy;
pub mod routes;
pub mod services;

use axum::{middleware as axum_middleware, routing::get, Router};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};

use crate::services::storage::BlobStore;

#[derive(Clone)]
pub struct AppState {
    pub db: db::Database,
    pub config: config::Config,
    pub blobs: BlobStore,
}

/// The JSON API, mounted under `/api` by [`build_router`].
pub fn api_router(state: &AppState) -> Router<AppState> {
    let admin_routes = routes::admin::router()
        .route_layer(axum_middleware::from_fn(middleware::auth::require_admin));

    // Build protected routes (require authentication)
    let protected_routes = Router::new()
        .merge(routes::auth::protected_router())
        .nest("/projects", routes::projects::router())
        .merge(routes::messages::router())
        .merge(routes::files::router(state.config.max_upload_bytes))
        .nest("/admin", admin_routes)
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    Router::new()
        .merge(routes::auth::router())
        .merge(protected_routes)
}

pub fn build_router(state: AppState) -> Router {
    let index = std::path::Path::new(&state.config.static_dir).join("index.html");
    let spa = ServeDir::new(&state.config.static_dir).fallback(ServeFile::new(index));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_router(&state))
        .fallback_service(spa)
        .with_state(state)
        .layer(
            ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
        )
}

async fn health_check() -> &'static str {
    "OK"
}
