pub mod health;

use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::generation::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Generation pipelines
        .route("/api/v1/ideas", post(handlers::handle_generate_ideas))
        .route(
            "/api/v1/projects/:id/caption",
            post(handlers::handle_regenerate_caption),
        )
        .route(
            "/api/v1/projects/:id/brand-alignment",
            post(handlers::handle_brand_alignment),
        )
        .route(
            "/api/v1/projects/:id/brand-alignment/latest",
            get(handlers::handle_latest_brand_report),
        )
        // Run history
        .route("/api/v1/runs", get(handlers::handle_list_runs))
        .route("/api/v1/runs/:id", get(handlers::handle_get_run))
        .route(
            "/api/v1/runs/:id/exclusion",
            patch(handlers::handle_set_exclusion),
        )
        .with_state(state)
}
