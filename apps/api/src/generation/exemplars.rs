//! Negative exemplars: prior outputs for the same target, folded into the next
//! prompt so the model does not repeat what was already produced and rejected.
//!
//! Runs a reviewer flagged `excluded_from_prompt` never appear. Read-only.

use serde_json::Value;
use uuid::Uuid;

use crate::generation::error::PipelineError;
use crate::models::run::{RunKind, RunRow};
use crate::store::RunStore;

/// One prior artifact offered as an example to avoid.
#[derive(Debug, Clone)]
pub struct Exemplar {
    pub run_id: Uuid,
    pub text: String,
}

/// Prior non-excluded artifacts for the target, oldest first.
pub async fn collect(
    store: &dyn RunStore,
    account_id: Uuid,
    target_id: Uuid,
    kind: RunKind,
    context_key: Option<&str>,
) -> Result<Vec<Exemplar>, PipelineError> {
    let runs = store
        .exemplar_runs(account_id, target_id, kind, context_key)
        .await?;
    Ok(runs.iter().filter_map(|run| from_run(kind, run)).collect())
}

fn from_run(kind: RunKind, run: &RunRow) -> Option<Exemplar> {
    if run.excluded_from_prompt {
        return None;
    }
    let artifact = run.output_artifact.as_ref()?;
    Some(Exemplar {
        run_id: run.id,
        text: describe(kind, artifact),
    })
}

/// Renders an artifact the way it should read inside a prompt.
fn describe(kind: RunKind, artifact: &Value) -> String {
    match (kind, artifact) {
        (_, Value::String(s)) => s.clone(),
        (RunKind::Ideas, Value::Object(map)) => match map.get("topics").and_then(Value::as_array) {
            Some(topics) => topics
                .iter()
                .enumerate()
                .map(|(i, topic)| describe_topic(i, topic))
                .collect::<Vec<_>>()
                .join("\n"),
            None => artifact.to_string(),
        },
        (RunKind::BrandAlignment, Value::Object(map)) => map
            .get("summary")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| artifact.to_string()),
        _ => artifact.to_string(),
    }
}

fn describe_topic(index: usize, topic: &Value) -> String {
    let title = topic.get("title").and_then(Value::as_str).unwrap_or("(untitled)");
    let mut text = format!("{}. {title}", index + 1);
    let groups = topic.get("bullets").and_then(Value::as_array);
    for group in groups.into_iter().flatten() {
        if let Some(heading) = group.get("heading").and_then(Value::as_str) {
            text.push_str(&format!("\n   - {heading}"));
        }
        let points = group.get("points").and_then(Value::as_array);
        for point in points.into_iter().flatten().filter_map(Value::as_str) {
            text.push_str(&format!("\n     * {point}"));
        }
    }
    text
}

/// The instruction block embedded in the prompt.
pub fn render_block(exemplars: &[Exemplar]) -> String {
    if exemplars.is_empty() {
        return "No prior attempts exist for this target.".to_string();
    }

    let mut block = format!(
        "The following {} prior attempt(s) were rejected. Do not repeat their structure or phrasing.\n",
        exemplars.len()
    );
    for (i, exemplar) in exemplars.iter().enumerate() {
        block.push_str(&format!("\n--- Rejected attempt {} ---\n{}\n", i + 1, exemplar.text));
    }
    block
}
