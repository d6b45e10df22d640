//! Team finder.
//!
//! A REST backend for team-formation listings plus the offline-first client
//! data layer that talks to it: remote-first writes with a local cache
//! fallback, a pending-mutation queue replayed on reconnect, and cross-tab
//! change notifications.

pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod db;
pub mod errors;
pub mod models;

use std::sync::Arc;

use axum::{
    http::HeaderValue,
    middleware,
    routing::{delete, get},
    Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use db::Repository;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Arc<Config>,
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(allowed_origins(&state.config.cors_origins))
        .allow_methods(Any)
        .allow_headers(Any);

    // Clone the password for the admin layer
    let admin_password = state.config.admin_password.clone();

    let admin_routes = Router::new()
        .route("/requests/{id}", delete(api::admin_delete_request))
        .layer(middleware::from_fn(move |req, next| {
            auth::admin_gate_layer(admin_password.clone(), req, next)
        }));

    let api_routes = Router::new()
        .route(
            "/requests",
            get(api::list_requests).post(api::create_request),
        )
        .route(
            "/requests/{id}",
            get(api::get_request)
                .put(api::update_request)
                .delete(api::delete_request),
        )
        .nest("/admin", admin_routes);

    // Health check, also used by the client connectivity probe
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn allowed_origins(origins: &[String]) -> AllowOrigin {
    if origins.is_empty() {
        return AllowOrigin::any();
    }
    let values: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();
    AllowOrigin::list(values)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}
