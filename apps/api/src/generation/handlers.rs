//! Axum route handlers for the Generation API.
//!
//! Pipelines run on a spawned task: if the client goes away mid-call the run
//! still reaches a terminal state.

use std::future::Future;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::generation::brand_alignment::{BrandAlignmentOutcome, BrandAlignmentReport, BrandAlignmentRequest};
use crate::generation::caption::{CaptionOutcome, RegenerateCaptionRequest};
use crate::generation::error::PipelineError;
use crate::generation::ideas::{GenerateIdeasRequest, IdeasOutcome};
use crate::models::run::{RunKind, RunRow, RunStatus};
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AccountQuery {
    pub account_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct RunListQuery {
    pub account_id: Uuid,
    pub target_id: Uuid,
    pub kind: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExclusionRequest {
    pub account_id: Uuid,
    pub excluded: bool,
}

#[derive(Debug, Serialize)]
pub struct LatestReportResponse {
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub report: BrandAlignmentReport,
}

// ────────────────────────────────────────────────────────────────────────────
// Pipelines
// ────────────────────────────────────────────────────────────────────────────

async fn detached<F, T>(pipeline: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, PipelineError>> + Send + 'static,
    T: Send + 'static,
{
    let result = tokio::spawn(pipeline)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;
    Ok(result?)
}

/// POST /api/v1/ideas
///
/// Two-stage topic generation for a source document.
pub async fn handle_generate_ideas(
    State(state): State<AppState>,
    Json(request): Json<GenerateIdeasRequest>,
) -> Result<Json<IdeasOutcome>, AppError> {
    let orchestrator = state.orchestrator.clone();
    let outcome = detached(async move { orchestrator.generate_ideas(request).await }).await?;
    Ok(Json(outcome))
}

/// POST /api/v1/projects/:id/caption
pub async fn handle_regenerate_caption(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Json(request): Json<RegenerateCaptionRequest>,
) -> Result<Json<CaptionOutcome>, AppError> {
    let orchestrator = state.orchestrator.clone();
    let outcome = detached(async move {
        orchestrator
            .regenerate_caption(request.account_id, project_id)
            .await
    })
    .await?;
    Ok(Json(outcome))
}

/// POST /api/v1/projects/:id/brand-alignment
pub async fn handle_brand_alignment(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Json(request): Json<BrandAlignmentRequest>,
) -> Result<Json<BrandAlignmentOutcome>, AppError> {
    let orchestrator = state.orchestrator.clone();
    let outcome = detached(async move {
        orchestrator
            .audit_brand_alignment(request.account_id, project_id)
            .await
    })
    .await?;
    Ok(Json(outcome))
}

/// GET /api/v1/projects/:id/brand-alignment/latest?account_id=
pub async fn handle_latest_brand_report(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Query(query): Query<AccountQuery>,
) -> Result<Json<LatestReportResponse>, AppError> {
    let (run, report) = state
        .orchestrator
        .latest_brand_report(query.account_id, project_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No brand alignment report for project {project_id}")))?;

    Ok(Json(LatestReportResponse {
        run_id: run.id,
        created_at: run.created_at,
        report,
    }))
}

// ────────────────────────────────────────────────────────────────────────────
// Run history
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/v1/runs/:id?account_id=
pub async fn handle_get_run(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
    Query(query): Query<AccountQuery>,
) -> Result<Json<RunRow>, AppError> {
    let run = state
        .orchestrator
        .runs()
        .get_run(query.account_id, run_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Run {run_id} not found")))?;
    Ok(Json(run))
}

/// GET /api/v1/runs?account_id=&target_id=&kind=
///
/// All runs for a target, oldest first.
pub async fn handle_list_runs(
    State(state): State<AppState>,
    Query(query): Query<RunListQuery>,
) -> Result<Json<Vec<RunRow>>, AppError> {
    let kind = query
        .kind
        .as_deref()
        .map(str::parse::<RunKind>)
        .transpose()
        .map_err(AppError::Validation)?;

    let runs = state
        .orchestrator
        .runs()
        .list_runs(query.account_id, query.target_id, kind)
        .await?;
    Ok(Json(runs))
}

/// PATCH /api/v1/runs/:id/exclusion
///
/// Reviewer toggle: an excluded artifact is never offered as an exemplar again.
/// The only mutation allowed on a finished run.
pub async fn handle_set_exclusion(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
    Json(request): Json<ExclusionRequest>,
) -> Result<Json<RunRow>, AppError> {
    let runs = state.orchestrator.runs();
    let run = runs
        .get_run(request.account_id, run_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Run {run_id} not found")))?;

    if !run.run_kind().is_some_and(|k| k.supports_exclusion()) {
        return Err(AppError::Validation(format!(
            "{} runs cannot be excluded from prompts",
            run.kind
        )));
    }
    if run.run_status() != Some(RunStatus::Completed) {
        return Err(AppError::Validation(format!(
            "only completed runs can be excluded (run is {})",
            run.status
        )));
    }

    let updated = runs
        .set_excluded(request.account_id, run_id, request.excluded)
        .await?
        .ok_or_else(|| AppError::Validation(format!("run {run_id} can no longer be excluded")))?;

    info!(
        run_id = %run_id,
        excluded = request.excluded,
        "Run exclusion updated"
    );
    Ok(Json(updated))
}
