use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub mod agent;
pub mod analytics;
pub mod config;
pub mod error;
pub mod geo;
pub mod handlers;
pub mod models;
pub mod recorder;
pub mod registry;
pub mod seed;
pub mod storage;

use config::AppConfig;
use geo::GeoResolver;
use recorder::ClickRecorder;
use registry::LinkRegistry;
use storage::LinkStore;

// ── Shared application state ───────────────────────────────────────────────

pub struct AppState {
    pub config: AppConfig,
    pub registry: LinkRegistry,
    pub recorder: ClickRecorder,
}

impl AppState {
    /// Wire the registry and recorder over one shared store.
    pub fn new(config: AppConfig, store: Arc<dyn LinkStore>, geo: GeoResolver) -> Self {
        Self {
            registry: LinkRegistry::new(store.clone(), config.max_code_attempts),
            recorder: ClickRecorder::new(store, geo),
            config,
        }
    }
}

// ── Router ─────────────────────────────────────────────────────────────────

pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route(
            "/links",
            post(handlers::links::create_link).get(handlers::links::list_links),
        )
        .route("/links/:code/deactivate", post(handlers::links::deactivate_link))
        .route("/links/:code/reactivate", post(handlers::links::reactivate_link))
        .route("/track/:code", post(handlers::track::track_click))
        .route("/analytics/:code", get(handlers::analytics::link_analytics));

    Router::new()
        // Health check for load balancers, no body
        .route("/health", get(|| async { axum::http::StatusCode::OK }))
        .nest("/api", api)
        // Short-link redirect; must come LAST so /api/* takes priority
        .route("/:code", get(handlers::redirect::redirect))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
