use crate::generation::Orchestrator;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// The three pipelines plus read access to run history.
    pub orchestrator: Orchestrator,
}
