//! Caption regeneration. Single call, plain-text artifact.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::generation::error::PipelineError;
use crate::generation::exemplars;
use crate::generation::lifecycle::{markers, RunTracker};
use crate::generation::prompts::{format_slides, CAPTION_REGENERATE, CAPTION_REGENERATE_TEMPLATE};
use crate::generation::render::{render, sanitize};
use crate::generation::schema::SchemaError;
use crate::generation::Orchestrator;
use crate::llm_client::CompletionParams;
use crate::models::run::{NewRun, RunKind};

pub const MAX_CAPTION_CHARS: usize = 2200;

const CAPTION_PARAMS: CompletionParams = CompletionParams {
    max_tokens: 1024,
    temperature: 0.8,
    timeout: Duration::from_secs(45),
};

#[derive(Debug, Clone, Deserialize)]
pub struct RegenerateCaptionRequest {
    pub account_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct CaptionOutcome {
    pub run_id: Uuid,
    pub caption: String,
    /// Set when the run completed but the project could not be updated.
    pub warning: Option<String>,
}

impl Orchestrator {
    /// Generates a fresh caption for the project and writes it back.
    pub async fn regenerate_caption(&self, account_id: Uuid, project_id: Uuid) -> Result<CaptionOutcome, PipelineError> {
        let mut run = RunTracker::open(
            self.runs.as_ref(),
            NewRun {
                account_id,
                target_id: project_id,
                kind: RunKind::CaptionRegen,
                context_key: None,
                progress_marker: markers::ASSEMBLING_CONTEXT,
            },
        )
        .await?;

        let outcome = self.caption_stages(&mut run, account_id, project_id).await;
        let finished = run.finish(outcome).await?;

        // The run is already completed; a failed write-back only degrades the response.
        let warning = match self
            .workspace
            .set_project_caption(account_id, project_id, &finished.artifact)
            .await
        {
            Ok(()) => None,
            Err(e) => {
                warn!(run_id = %finished.run.id, "Caption generated but project update failed: {e}");
                Some(format!("caption was generated but could not be saved to the project: {e}"))
            }
        };

        Ok(CaptionOutcome {
            run_id: finished.run.id,
            caption: finished.artifact,
            warning,
        })
    }

    async fn caption_stages(
        &self,
        run: &mut RunTracker<'_>,
        account_id: Uuid,
        project_id: Uuid,
    ) -> Result<String, PipelineError> {
        let project = self
            .workspace
            .project(account_id, project_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("Project {project_id} not found")))?;
        let brand_voice = self
            .workspace
            .routing(account_id)
            .await?
            .and_then(|r| r.brand_voice)
            .unwrap_or_else(|| "No brand voice configured.".to_string());

        let prior = exemplars::collect(
            self.runs.as_ref(),
            account_id,
            project_id,
            RunKind::CaptionRegen,
            None,
        )
        .await?;

        let template = self
            .template(account_id, CAPTION_REGENERATE, CAPTION_REGENERATE_TEMPLATE)
            .await?;
        let slides = format_slides(&project.slides);
        let current_caption = project.caption.clone().unwrap_or_default();
        let prior_block = exemplars::render_block(&prior);
        let prompt = render(
            &template,
            &[
                ("project_title", &project.title),
                ("slides", &slides),
                ("current_caption", &current_caption),
                ("brand_voice", &brand_voice),
                ("prior_attempts", &prior_block),
            ],
        );
        run.record_prompt(&prompt);
        run.record_context("project_id", project.id);
        run.record_context("project_title", &project.title);
        run.record_context("slides", &project.slides);
        run.record_context("current_caption", &project.caption);
        run.record_context(
            "exemplar_run_ids",
            prior.iter().map(|e| e.run_id).collect::<Vec<_>>(),
        );

        run.progress(markers::CALLING_STAGE_2).await;
        let completion = self.llm.complete(&prompt, CAPTION_PARAMS).await?;
        run.record_model(completion.model);

        run.progress(markers::VALIDATING).await;
        let caption = validate_caption(&completion.text).map_err(|e| PipelineError::schema("caption", e))?;

        info!(
            "Regenerated caption for project {} ({} chars, run {})",
            project_id,
            caption.chars().count(),
            run.id()
        );
        Ok(caption)
    }
}

/// Normalizes raw model text into a caption: sanitized, trimmed, non-empty and
/// within the platform limit.
pub fn validate_caption(raw: &str) -> Result<String, SchemaError> {
    let caption = sanitize(raw);
    if caption.is_empty() {
        return Err(SchemaError::new("caption", "must be non-empty text"));
    }
    let chars = caption.chars().count();
    if chars > MAX_CAPTION_CHARS {
        return Err(SchemaError::new(
            "caption",
            format!("is {chars} characters; limit is {MAX_CAPTION_CHARS}"),
        ));
    }
    Ok(caption)
}
