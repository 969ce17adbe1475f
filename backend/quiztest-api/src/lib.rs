use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod repositories;
pub mod services;
pub mod utils;

pub use config::Config;
pub use error::{EngineError, EngineResult};
pub use services::AppState;

pub fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_handler))
        .nest("/api/v1", api_routes())
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(middleware::from_fn(
            middlewares::trace::trace_context_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/units/{unit_id}/attempts",
            post(handlers::attempts::create_attempt),
        )
        .route(
            "/units/{unit_id}/retry-attempts",
            post(handlers::attempts::create_retry_attempt),
        )
        .route(
            "/units/{unit_id}/students/{student_id}/completeness",
            get(handlers::attempts::get_completeness),
        )
        .route(
            "/attempts/{attempt_id}/answers",
            post(handlers::attempts::grade_answer),
        )
}
