//! Topic ideas: two chained calls.
//!
//! Flow: load source → prior idea sets (same source + topic count) → stage-1
//! agent brainstorm → stage-2 completion structures the reply as JSON →
//! extract → validate exactly `topic_count` topics → persist.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;
use uuid::Uuid;

use crate::generation::error::{PipelineError, Stage};
use crate::generation::exemplars;
use crate::generation::lifecycle::{markers, RunTracker};
use crate::generation::prompts::{
    IDEAS_AGENT, IDEAS_AGENT_TEMPLATE, IDEAS_STRUCTURE, IDEAS_STRUCTURE_TEMPLATE,
};
use crate::generation::render::render;
use crate::generation::schema::{self, Cardinality, SchemaError};
use crate::generation::Orchestrator;
use crate::llm_client::{extract_json_object, CompletionParams};
use crate::models::run::{NewRun, RunKind};

pub const MAX_TOPICS: u8 = 10;
const MAX_BULLET_GROUPS: usize = 8;
const MAX_POINTS: usize = 8;
const MAX_TITLE_CHARS: usize = 200;
const MAX_POINT_CHARS: usize = 500;

const IDEAS_PARAMS: CompletionParams = CompletionParams {
    max_tokens: 4096,
    temperature: 0.3,
    timeout: Duration::from_secs(60),
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulletGroup {
    pub heading: String,
    pub points: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicIdea {
    pub title: String,
    pub bullets: Vec<BulletGroup>,
}

/// Persisted artifact of an ideas run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdeasArtifact {
    pub topics: Vec<TopicIdea>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateIdeasRequest {
    pub account_id: Uuid,
    pub source_id: Uuid,
    pub topic_count: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct IdeasOutcome {
    pub run_id: Uuid,
    pub topics: Vec<TopicIdea>,
    pub model_used: String,
}

impl Orchestrator {
    /// Runs the ideas pipeline for one source document.
    pub async fn generate_ideas(&self, request: GenerateIdeasRequest) -> Result<IdeasOutcome, PipelineError> {
        if request.topic_count == 0 || request.topic_count > MAX_TOPICS {
            return Err(PipelineError::InvalidRequest(format!(
                "topic_count must be between 1 and {MAX_TOPICS}"
            )));
        }

        let context_key = format!("topics:{}", request.topic_count);
        let mut run = RunTracker::open(
            self.runs.as_ref(),
            NewRun {
                account_id: request.account_id,
                target_id: request.source_id,
                kind: RunKind::Ideas,
                context_key: Some(context_key.clone()),
                progress_marker: markers::ASSEMBLING_CONTEXT,
            },
        )
        .await?;

        let outcome = self.ideas_stages(&mut run, &request, &context_key).await;
        let finished = run.finish(outcome).await?;

        Ok(IdeasOutcome {
            run_id: finished.run.id,
            model_used: finished.run.model_used.clone().unwrap_or_default(),
            topics: finished.artifact.topics,
        })
    }

    async fn ideas_stages(
        &self,
        run: &mut RunTracker<'_>,
        request: &GenerateIdeasRequest,
        context_key: &str,
    ) -> Result<IdeasArtifact, PipelineError> {
        let account_id = request.account_id;
        let topic_count = request.topic_count.to_string();

        // Step 1: Collaborator context
        let source = self
            .workspace
            .source_content(account_id, request.source_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("Source {} not found", request.source_id)))?;
        let routing = self.workspace.routing(account_id).await?;
        let agent_url = routing.as_ref().and_then(|r| r.agent_url.clone());

        // Step 2: Prior idea sets for this source + count
        let prior = exemplars::collect(
            self.runs.as_ref(),
            account_id,
            request.source_id,
            RunKind::Ideas,
            Some(context_key),
        )
        .await?;

        // Step 3: Stage-1 prompt
        let agent_template = self.template(account_id, IDEAS_AGENT, IDEAS_AGENT_TEMPLATE).await?;
        let prior_block = exemplars::render_block(&prior);
        let agent_prompt = render(
            &agent_template,
            &[
                ("source_title", &source.title),
                ("source_text", &source.body),
                ("topic_count", &topic_count),
                ("prior_attempts", &prior_block),
            ],
        );
        run.record_context("source_id", source.id);
        run.record_context("source_title", &source.title);
        run.record_context("topic_count", request.topic_count);
        run.record_context(
            "exemplar_run_ids",
            prior.iter().map(|e| e.run_id).collect::<Vec<_>>(),
        );
        run.record_context("agent_prompt", &agent_prompt);

        // Step 4: Stage-1 agent call
        run.progress(markers::CALLING_STAGE_1).await;
        let reply = self.agent.converse(agent_url.as_deref(), &agent_prompt).await?;
        if reply.text.trim().is_empty() {
            return Err(PipelineError::EmptyOutput { stage: Stage::Agent });
        }
        run.record_context("agent_model", &reply.model);
        run.record_context("agent_reply", &reply.text);

        // Step 5: Stage-2 structuring call
        let structure_template = self
            .template(account_id, IDEAS_STRUCTURE, IDEAS_STRUCTURE_TEMPLATE)
            .await?;
        let prompt = render(
            &structure_template,
            &[("agent_reply", &reply.text), ("topic_count", &topic_count)],
        );
        run.record_prompt(&prompt);

        run.progress(markers::CALLING_STAGE_2).await;
        let completion = self.llm.complete(&prompt, IDEAS_PARAMS).await?;
        run.record_model(match &reply.model {
            Some(agent_model) => format!("{agent_model}+{}", completion.model),
            None => completion.model.to_string(),
        });

        // Step 6: Extract + validate
        run.progress(markers::PARSING).await;
        let payload = extract_json_object(&completion.text, "ideas")?;

        run.progress(markers::VALIDATING).await;
        let topics = validate_ideas(&payload, usize::from(request.topic_count))
            .map_err(|e| PipelineError::schema("ideas", e))?;

        info!(
            "Generated {} topic ideas for source {} (run {})",
            topics.len(),
            request.source_id,
            run.id()
        );
        Ok(IdeasArtifact { topics })
    }
}

/// Validates the structured ideas payload: `{"topics": [...]}` with exactly
/// `topic_count` well-formed topics and nothing else.
pub fn validate_ideas(payload: &Map<String, Value>, topic_count: usize) -> Result<Vec<TopicIdea>, SchemaError> {
    schema::closed(payload, "", &["topics"])?;
    let topics = schema::array(
        schema::field(payload, "", "topics")?,
        "topics",
        Cardinality::Exactly(topic_count),
    )?;

    topics
        .iter()
        .enumerate()
        .map(|(i, topic)| validate_topic(topic, &schema::item("topics", i)))
        .collect()
}

fn validate_topic(value: &Value, path: &str) -> Result<TopicIdea, SchemaError> {
    let topic = schema::object(value, path, &["title", "bullets"])?;
    let title = schema::text(schema::field(topic, path, "title")?, &schema::child(path, "title"), MAX_TITLE_CHARS)?;

    let bullets_path = schema::child(path, "bullets");
    let groups = non_empty(
        schema::array(
            schema::field(topic, path, "bullets")?,
            &bullets_path,
            Cardinality::AtMost(MAX_BULLET_GROUPS),
        )?,
        &bullets_path,
    )?;

    let bullets = groups
        .iter()
        .enumerate()
        .map(|(i, group)| {
            let group_path = schema::item(&bullets_path, i);
            let map = schema::object(group, &group_path, &["heading", "points"])?;
            let heading = schema::text(
                schema::field(map, &group_path, "heading")?,
                &schema::child(&group_path, "heading"),
                MAX_TITLE_CHARS,
            )?;
            let points_path = schema::child(&group_path, "points");
            let points = schema::text_list(
                schema::field(map, &group_path, "points")?,
                &points_path,
                MAX_POINTS,
                MAX_POINT_CHARS,
            )?;
            if points.is_empty() {
                return Err(SchemaError::new(&points_path, "must not be empty"));
            }
            Ok(BulletGroup { heading, points })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(TopicIdea { title, bullets })
}

fn non_empty<'a>(items: &'a [Value], path: &str) -> Result<&'a [Value], SchemaError> {
    if items.is_empty() {
        return Err(SchemaError::new(path, "must not be empty"));
    }
    Ok(items)
}
