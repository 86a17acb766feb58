//! Persistence seams. Postgres implementations live alongside; handlers and
//! pipelines only see the traits, carried in `AppState` as `Arc<dyn ...>`.

pub mod runs;
pub mod workspace;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::run::{NewRun, RunCompletion, RunFailure, RunKind, RunRow};
use crate::models::workspace::{AccountRouting, Project, SourceContent};

pub use runs::PgRunStore;

/// Error recorded on running rows reaped as stale when a new run opens.
pub const ABANDONED_ERROR: &str = "abandoned: run did not finish in time";
pub use workspace::PgWorkspaceStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("a {kind} run is already in progress for target {target_id}")]
    ActiveRun { kind: RunKind, target_id: Uuid },

    #[error("run {0} is not running")]
    NotRunning(Uuid),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Run records (`generation_runs`).
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Inserts a run in `running` with its first progress marker.
    async fn create_run(&self, new_run: &NewRun) -> Result<RunRow, StoreError>;

    async fn set_progress(&self, run_id: Uuid, marker: &str) -> Result<(), StoreError>;

    /// running → completed, storing the artifact and clearing error/marker.
    async fn complete_run(&self, run_id: Uuid, completion: &RunCompletion) -> Result<RunRow, StoreError>;

    /// running → failed, storing the error and clearing the marker.
    async fn fail_run(&self, run_id: Uuid, failure: &RunFailure) -> Result<RunRow, StoreError>;

    async fn get_run(&self, account_id: Uuid, run_id: Uuid) -> Result<Option<RunRow>, StoreError>;

    /// All runs for a target, oldest first.
    async fn list_runs(
        &self,
        account_id: Uuid,
        target_id: Uuid,
        kind: Option<RunKind>,
    ) -> Result<Vec<RunRow>, StoreError>;

    /// Completed, non-excluded runs for a target/context, oldest first.
    async fn exemplar_runs(
        &self,
        account_id: Uuid,
        target_id: Uuid,
        kind: RunKind,
        context_key: Option<&str>,
    ) -> Result<Vec<RunRow>, StoreError>;

    /// Reviewer toggle. Only completed caption and brand-alignment runs are
    /// updated; returns `None` for any other run or one the account does not own.
    async fn set_excluded(
        &self,
        account_id: Uuid,
        run_id: Uuid,
        excluded: bool,
    ) -> Result<Option<RunRow>, StoreError>;
}

/// Collaborator reads plus the denormalized caption write-back.
#[async_trait]
pub trait WorkspaceStore: Send + Sync {
    async fn routing(&self, account_id: Uuid) -> Result<Option<AccountRouting>, StoreError>;

    async fn template_override(&self, account_id: Uuid, name: &str) -> Result<Option<String>, StoreError>;

    async fn source_content(&self, account_id: Uuid, source_id: Uuid) -> Result<Option<SourceContent>, StoreError>;

    async fn project(&self, account_id: Uuid, project_id: Uuid) -> Result<Option<Project>, StoreError>;

    async fn set_project_caption(
        &self,
        account_id: Uuid,
        project_id: Uuid,
        caption: &str,
    ) -> Result<(), StoreError>;
}
