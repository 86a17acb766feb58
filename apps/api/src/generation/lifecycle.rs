//! Run lifecycle: open a run in `running`, move its progress marker along,
//! and finalize it exactly once as `completed` (with artifact) or `failed`
//! (with error).
//!
//! Progress markers are observational. A failed marker write is logged and
//! ignored; only `status` is meant to be branched on.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::generation::error::PipelineError;
use crate::models::run::{NewRun, RunCompletion, RunFailure, RunRow};
use crate::store::RunStore;

/// Sub-stage labels written to `progress_marker` while a run is running.
pub mod markers {
    pub const ASSEMBLING_CONTEXT: &str = "assembling-context";
    pub const CALLING_STAGE_1: &str = "calling-stage-1";
    pub const CALLING_STAGE_2: &str = "calling-stage-2";
    pub const PARSING: &str = "parsing";
    pub const VALIDATING: &str = "validating";
    pub const PERSISTING: &str = "persisting";
}

/// A finalized successful run and its typed artifact.
#[derive(Debug)]
pub struct Finished<T> {
    pub run: RunRow,
    pub artifact: T,
}

/// Handle on one open run. Consumed by `finish`.
pub struct RunTracker<'a> {
    store: &'a dyn RunStore,
    run: RunRow,
    prompt: Option<String>,
    input_context: Map<String, Value>,
    model_used: Option<String>,
}

impl<'a> RunTracker<'a> {
    /// Creates the run row in `running` with `new_run.progress_marker` set.
    pub async fn open(store: &'a dyn RunStore, new_run: NewRun) -> Result<RunTracker<'a>, PipelineError> {
        let run = store.create_run(&new_run).await?;
        info!(
            run_id = %run.id,
            kind = %new_run.kind,
            target_id = %new_run.target_id,
            "Run started"
        );
        Ok(RunTracker {
            store,
            run,
            prompt: None,
            input_context: Map::new(),
            model_used: None,
        })
    }

    pub fn id(&self) -> Uuid {
        self.run.id
    }

    /// Best-effort marker update.
    pub async fn progress(&self, marker: &str) {
        if let Err(e) = self.store.set_progress(self.run.id, marker).await {
            warn!(run_id = %self.run.id, marker, "Failed to record progress marker: {e}");
        }
    }

    /// Adds one field to the input-context snapshot kept for replay.
    pub fn record_context(&mut self, key: &str, value: impl Serialize) {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.input_context.insert(key.to_string(), value);
    }

    /// The exact text sent to the final generative call.
    pub fn record_prompt(&mut self, prompt: &str) {
        self.prompt = Some(prompt.to_string());
    }

    pub fn record_model(&mut self, model: impl Into<String>) {
        self.model_used = Some(model.into());
    }

    /// Finalizes the run from the pipeline outcome.
    ///
    /// On success the artifact, prompt and context are written together with
    /// `status = completed`. On failure the same error is persisted and
    /// returned. A failure to persist completion fails the run instead.
    pub async fn finish<T: Serialize>(
        self,
        outcome: Result<T, PipelineError>,
    ) -> Result<Finished<T>, PipelineError> {
        let artifact = match outcome {
            Ok(artifact) => artifact,
            Err(e) => return Err(self.fail(e).await),
        };

        self.progress(markers::PERSISTING).await;

        let value = match serde_json::to_value(&artifact) {
            Ok(value) => value,
            Err(e) => {
                return Err(self
                    .fail(PipelineError::Internal(format!("artifact serialization failed: {e}")))
                    .await)
            }
        };

        let completion = RunCompletion {
            artifact: value,
            prompt_rendered: self.prompt.clone(),
            input_context: Value::Object(self.input_context.clone()),
            model_used: self.model_used.clone(),
        };

        match self.store.complete_run(self.run.id, &completion).await {
            Ok(run) => {
                info!(run_id = %run.id, kind = %run.kind, "Run completed");
                Ok(Finished { run, artifact })
            }
            Err(e) => Err(self.fail(e.into()).await),
        }
    }

    async fn fail(self, e: PipelineError) -> PipelineError {
        let failure = RunFailure {
            error: e.to_string(),
            prompt_rendered: self.prompt,
            input_context: Value::Object(self.input_context),
        };
        match self.store.fail_run(self.run.id, &failure).await {
            Ok(_) => warn!(run_id = %self.run.id, kind = %self.run.kind, "Run failed: {}", failure.error),
            Err(store_err) => error!(
                run_id = %self.run.id,
                "Run failed ({}) and the failure could not be recorded: {store_err}",
                failure.error
            ),
        }
        e
    }
}
