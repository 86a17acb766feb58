//! Brand-alignment audit of a six-slide carousel.
//!
//! The model proposes a full report; every field is validated against a closed
//! schema and the verdict is recomputed from `overallScore` before persisting.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;
use uuid::Uuid;

use crate::generation::error::PipelineError;
use crate::generation::lifecycle::{markers, RunTracker};
use crate::generation::prompts::{format_slides, BRAND_AUDIT, BRAND_AUDIT_TEMPLATE};
use crate::generation::render::render;
use crate::generation::schema::{self, Cardinality, SchemaError};
use crate::generation::verdict::Verdict;
use crate::generation::Orchestrator;
use crate::llm_client::{extract_json_object, CompletionParams};
use crate::models::run::{NewRun, RunKind, RunRow};

pub const SCHEMA_VERSION: i64 = 1;
pub const SLIDE_COUNT: usize = 6;
const MAX_ISSUES: usize = 50;
const MAX_NOTES: usize = 20;
const MAX_TEXT_CHARS: usize = 2000;

const BRAND_PARAMS: CompletionParams = CompletionParams {
    max_tokens: 4096,
    temperature: 0.2,
    timeout: Duration::from_secs(90),
};

const TIMEOUT_HINT: &str = "brand alignment audit timed out; try again or shorten the prompt";

const CHECK_KEYS: [&str; 6] = [
    "voiceAndTone",
    "terminology",
    "audienceFit",
    "visualConsistency",
    "claimsSubstantiated",
    "callToAction",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    fn parse(value: &Value, path: &str) -> Result<Self, SchemaError> {
        Ok(match schema::one_of(value, path, &["low", "medium", "high"])? {
            "low" => Severity::Low,
            "medium" => Severity::Medium,
            _ => Severity::High,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueArea {
    Caption,
    Slide,
    Overall,
}

impl IssueArea {
    fn parse(value: &Value, path: &str) -> Result<Self, SchemaError> {
        Ok(match schema::one_of(value, path, &["caption", "slide", "overall"])? {
            "caption" => IssueArea::Caption,
            "slide" => IssueArea::Slide,
            _ => IssueArea::Overall,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrandChecks {
    pub voice_and_tone: bool,
    pub terminology: bool,
    pub audience_fit: bool,
    pub visual_consistency: bool,
    pub claims_substantiated: bool,
    pub call_to_action: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub severity: Severity,
    pub area: IssueArea,
    pub slide_index: Option<u8>,
    pub quote: Option<String>,
    pub message: String,
    pub recommendation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredSection {
    pub score: u8,
    pub notes: Vec<String>,
    pub suggested_edits: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlideReview {
    pub slide_index: u8,
    pub score: u8,
    pub notes: Vec<String>,
    pub suggested_edits: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrandAlignmentReport {
    pub schema_version: u8,
    pub verdict: Verdict,
    pub overall_score: u8,
    pub summary: String,
    pub checks: BrandChecks,
    pub issues: Vec<Issue>,
    pub caption: ScoredSection,
    /// Exactly six entries, ordered by `slide_index`.
    pub slides: Vec<SlideReview>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrandAlignmentRequest {
    pub account_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct BrandAlignmentOutcome {
    pub run_id: Uuid,
    pub report: BrandAlignmentReport,
}

impl Orchestrator {
    /// Audits the project's slides and caption against the account's brand guidelines.
    pub async fn audit_brand_alignment(
        &self,
        account_id: Uuid,
        project_id: Uuid,
    ) -> Result<BrandAlignmentOutcome, PipelineError> {
        let mut run = RunTracker::open(
            self.runs.as_ref(),
            NewRun {
                account_id,
                target_id: project_id,
                kind: RunKind::BrandAlignment,
                context_key: None,
                progress_marker: markers::ASSEMBLING_CONTEXT,
            },
        )
        .await?;

        let outcome = self
            .brand_stages(&mut run, account_id, project_id)
            .await
            .map_err(|e| e.with_timeout_hint(TIMEOUT_HINT));
        let finished = run.finish(outcome).await?;

        Ok(BrandAlignmentOutcome {
            run_id: finished.run.id,
            report: finished.artifact,
        })
    }

    /// Most recent completed report for the project that a reviewer has not excluded.
    pub async fn latest_brand_report(
        &self,
        account_id: Uuid,
        project_id: Uuid,
    ) -> Result<Option<(RunRow, BrandAlignmentReport)>, PipelineError> {
        let runs = self
            .runs
            .exemplar_runs(account_id, project_id, RunKind::BrandAlignment, None)
            .await?;

        for run in runs.into_iter().rev() {
            let Some(artifact) = run.output_artifact.clone() else {
                continue;
            };
            match serde_json::from_value::<BrandAlignmentReport>(artifact) {
                Ok(report) => return Ok(Some((run, report))),
                Err(e) => {
                    tracing::warn!(run_id = %run.id, "Skipping unreadable brand report: {e}");
                }
            }
        }
        Ok(None)
    }

    async fn brand_stages(
        &self,
        run: &mut RunTracker<'_>,
        account_id: Uuid,
        project_id: Uuid,
    ) -> Result<BrandAlignmentReport, PipelineError> {
        let project = self
            .workspace
            .project(account_id, project_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("Project {project_id} not found")))?;
        if project.slides.len() != SLIDE_COUNT {
            return Err(PipelineError::InvalidRequest(format!(
                "brand alignment needs exactly {SLIDE_COUNT} slides; project has {}",
                project.slides.len()
            )));
        }
        let guidelines = self
            .workspace
            .routing(account_id)
            .await?
            .and_then(|r| r.brand_guidelines)
            .filter(|g| !g.trim().is_empty())
            .ok_or_else(|| PipelineError::Config("no brand guidelines configured for this account".into()))?;

        let template = self.template(account_id, BRAND_AUDIT, BRAND_AUDIT_TEMPLATE).await?;
        let slides = format_slides(&project.slides);
        let caption = project.caption.clone().unwrap_or_default();
        let prompt = render(
            &template,
            &[
                ("brand_guidelines", &guidelines),
                ("project_title", &project.title),
                ("slides", &slides),
                ("caption", &caption),
            ],
        );
        run.record_prompt(&prompt);
        run.record_context("project_id", project.id);
        run.record_context("project_title", &project.title);
        run.record_context("slides", &project.slides);
        run.record_context("caption", &project.caption);

        run.progress(markers::CALLING_STAGE_2).await;
        let completion = self.llm.complete(&prompt, BRAND_PARAMS).await?;
        run.record_model(completion.model);

        run.progress(markers::PARSING).await;
        let payload = extract_json_object(&completion.text, "brand alignment")?;

        run.progress(markers::VALIDATING).await;
        let report = validate_report(&payload).map_err(|e| PipelineError::schema("brand alignment", e))?;

        info!(
            "Brand audit for project {}: score {} ({}), {} issues (run {})",
            project_id,
            report.overall_score,
            report.verdict.as_str(),
            report.issues.len(),
            run.id()
        );
        Ok(report)
    }
}

/// Validates a raw report payload. The model's `verdict` is checked for shape
/// and then replaced by the one derived from `overallScore`.
pub fn validate_report(payload: &Map<String, Value>) -> Result<BrandAlignmentReport, SchemaError> {
    schema::closed(
        payload,
        "",
        &[
            "schemaVersion",
            "verdict",
            "overallScore",
            "summary",
            "checks",
            "issues",
            "caption",
            "slides",
        ],
    )?;

    let version = schema::integer(schema::field(payload, "", "schemaVersion")?, "schemaVersion", 0, i64::MAX)?;
    if version != SCHEMA_VERSION {
        return Err(SchemaError::new("schemaVersion", format!("must be {SCHEMA_VERSION}")));
    }
    schema::one_of(schema::field(payload, "", "verdict")?, "verdict", &Verdict::ALL)?;
    let overall_score = score(schema::field(payload, "", "overallScore")?, "overallScore")?;
    let summary = schema::text(schema::field(payload, "", "summary")?, "summary", MAX_TEXT_CHARS)?;
    let checks = checks(schema::field(payload, "", "checks")?)?;

    let issues = schema::array(
        schema::field(payload, "", "issues")?,
        "issues",
        Cardinality::AtMost(MAX_ISSUES),
    )?
    .iter()
    .enumerate()
    .map(|(i, v)| issue(v, &schema::item("issues", i)))
    .collect::<Result<Vec<_>, _>>()?;

    let caption_path = "caption";
    let caption_map = schema::object(
        schema::field(payload, "", "caption")?,
        caption_path,
        &["score", "notes", "suggestedEdits"],
    )?;
    let caption = ScoredSection {
        score: score(schema::field(caption_map, caption_path, "score")?, "caption.score")?,
        notes: notes(caption_map, caption_path, "notes")?,
        suggested_edits: notes(caption_map, caption_path, "suggestedEdits")?,
    };

    let slides = slides(schema::field(payload, "", "slides")?)?;

    Ok(BrandAlignmentReport {
        schema_version: SCHEMA_VERSION as u8,
        verdict: Verdict::from_score(overall_score),
        overall_score,
        summary,
        checks,
        issues,
        caption,
        slides,
    })
}

fn score(value: &Value, path: &str) -> Result<u8, SchemaError> {
    schema::integer(value, path, 0, 100).map(|n| n as u8)
}

fn notes(map: &Map<String, Value>, path: &str, key: &str) -> Result<Vec<String>, SchemaError> {
    schema::text_list(
        schema::field(map, path, key)?,
        &schema::child(path, key),
        MAX_NOTES,
        MAX_TEXT_CHARS,
    )
}

fn checks(value: &Value) -> Result<BrandChecks, SchemaError> {
    let path = "checks";
    let map = schema::object(value, path, &CHECK_KEYS)?;
    let flag = |key: &str| schema::boolean(schema::field(map, path, key)?, &schema::child(path, key));
    Ok(BrandChecks {
        voice_and_tone: flag("voiceAndTone")?,
        terminology: flag("terminology")?,
        audience_fit: flag("audienceFit")?,
        visual_consistency: flag("visualConsistency")?,
        claims_substantiated: flag("claimsSubstantiated")?,
        call_to_action: flag("callToAction")?,
    })
}

fn issue(value: &Value, path: &str) -> Result<Issue, SchemaError> {
    let map = schema::object(
        value,
        path,
        &["severity", "area", "slideIndex", "quote", "message", "recommendation"],
    )?;
    let at = |key: &str| schema::child(path, key);

    let slide_index = schema::nullable_integer(
        schema::field(map, path, "slideIndex")?,
        &at("slideIndex"),
        0,
        SLIDE_COUNT as i64 - 1,
    )?
    .map(|n| n as u8);

    Ok(Issue {
        severity: Severity::parse(schema::field(map, path, "severity")?, &at("severity"))?,
        area: IssueArea::parse(schema::field(map, path, "area")?, &at("area"))?,
        slide_index,
        quote: schema::nullable_text(schema::field(map, path, "quote")?, &at("quote"), MAX_TEXT_CHARS)?,
        message: schema::text(schema::field(map, path, "message")?, &at("message"), MAX_TEXT_CHARS)?,
        recommendation: schema::text(
            schema::field(map, path, "recommendation")?,
            &at("recommendation"),
            MAX_TEXT_CHARS,
        )?,
    })
}

fn slides(value: &Value) -> Result<Vec<SlideReview>, SchemaError> {
    let entries = schema::array(value, "slides", Cardinality::Exactly(SLIDE_COUNT))?;
    let mut seen = BTreeSet::new();
    let mut reviews = Vec::with_capacity(SLIDE_COUNT);

    for (i, entry) in entries.iter().enumerate() {
        let path = schema::item("slides", i);
        let map = schema::object(entry, &path, &["slideIndex", "score", "notes", "suggestedEdits"])?;
        let index_path = schema::child(&path, "slideIndex");
        let slide_index = schema::integer(
            schema::field(map, &path, "slideIndex")?,
            &index_path,
            0,
            SLIDE_COUNT as i64 - 1,
        )? as u8;
        if !seen.insert(slide_index) {
            return Err(SchemaError::new(&index_path, format!("duplicates slide {slide_index}")));
        }
        reviews.push(SlideReview {
            slide_index,
            score: score(schema::field(map, &path, "score")?, &schema::child(&path, "score"))?,
            notes: notes(map, &path, "notes")?,
            suggested_edits: notes(map, &path, "suggestedEdits")?,
        });
    }

    reviews.sort_by_key(|r| r.slide_index);
    Ok(reviews)
}
