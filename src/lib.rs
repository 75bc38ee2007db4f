use std::sync::Arc;

use axum::{
    http::Method,
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod cache;
pub mod clicks;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod realtime;
pub mod service;
pub mod shortcode;

use config::AppConfig;
use realtime::Hub;
use service::UrlService;
use shortcode::RandomCode;

// ── Shared application state ───────────────────────────────────────────────

pub struct AppState {
    pub config: AppConfig,
    pub urls: UrlService,
    /// Fan-out to realtime viewers. `urls` publishes on a clone of this.
    pub hub: Hub,
}

impl AppState {
    pub fn new(config: AppConfig, db: sqlx::SqlitePool) -> Self {
        let hub = Hub::new(config.realtime_capacity);
        let codes = Arc::new(RandomCode::new(config.code_length));
        let urls = UrlService::new(db, hub.clone(), codes, &config);
        Self { config, urls, hub }
    }
}

// ── Router ─────────────────────────────────────────────────────────────────

pub fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any);

    let api = Router::new()
        .route("/shorten", post(handlers::api::shorten))
        .route("/urls", get(handlers::api::list))
        .route("/urls/:id", delete(handlers::api::delete));

    Router::new()
        .route("/health", get(|| async { axum::http::StatusCode::OK }))
        .route("/ws", get(handlers::ws::upgrade))
        .nest("/api", api)
        // Short-code redirect; static routes above take priority
        .route("/:code", get(handlers::redirect::redirect))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
