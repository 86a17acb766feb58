use std::fmt;
use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::generation::schema::SchemaError;
use crate::llm_client::{AgentError, ExtractError, LlmError};
use crate::models::run::RunKind;
use crate::store::StoreError;

/// Which external call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Agent,
    Completion,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Agent => "agent",
            Stage::Completion => "completion",
        })
    }
}

/// Everything that can stop a pipeline. The `Display` text is what the failed
/// run stores in `error` and what the caller receives.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{stage} call failed with status {status}: {body}")]
    Upstream { stage: Stage, status: u16, body: String },

    #[error("{stage} call failed: {message}")]
    Transport { stage: Stage, message: String },

    #[error("{}", timeout_message(.stage, .after, .hint))]
    Timeout {
        stage: Stage,
        after: Duration,
        hint: Option<&'static str>,
    },

    #[error("{stage} returned empty output")]
    EmptyOutput { stage: Stage },

    #[error(transparent)]
    Extraction(#[from] ExtractError),

    #[error("{source_name} payload rejected: {error}")]
    Schema {
        source_name: &'static str,
        error: SchemaError,
    },

    #[error("a {kind} run is already in progress for target {target_id}")]
    ActiveRun { kind: RunKind, target_id: Uuid },

    #[error("persistence error: {0}")]
    Persistence(StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

fn timeout_message(stage: &Stage, after: &Duration, hint: &Option<&'static str>) -> String {
    match hint {
        Some(hint) => hint.to_string(),
        None => format!("{stage} call aborted after {}s", after.as_secs()),
    }
}

impl PipelineError {
    pub fn schema(source_name: &'static str, error: SchemaError) -> Self {
        PipelineError::Schema { source_name, error }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, PipelineError::Timeout { .. })
    }

    /// Replaces a raw abort message with a caller-facing one. Other errors pass through.
    pub fn with_timeout_hint(self, message: &'static str) -> Self {
        match self {
            PipelineError::Timeout { stage, after, .. } => PipelineError::Timeout {
                stage,
                after,
                hint: Some(message),
            },
            other => other,
        }
    }
}

impl From<StoreError> for PipelineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::ActiveRun { kind, target_id } => PipelineError::ActiveRun { kind, target_id },
            other => PipelineError::Persistence(other),
        }
    }
}

impl From<LlmError> for PipelineError {
    fn from(e: LlmError) -> Self {
        let stage = Stage::Completion;
        match e {
            LlmError::MissingApiKey => PipelineError::Config(e.to_string()),
            LlmError::Api { status, message } => PipelineError::Upstream {
                stage,
                status,
                body: message,
            },
            LlmError::Timeout(after) => PipelineError::Timeout {
                stage,
                after,
                hint: None,
            },
            LlmError::EmptyContent => PipelineError::EmptyOutput { stage },
            LlmError::Http(e) => PipelineError::Transport {
                stage,
                message: e.to_string(),
            },
        }
    }
}

impl From<AgentError> for PipelineError {
    fn from(e: AgentError) -> Self {
        let stage = Stage::Agent;
        match e {
            AgentError::MissingApiKey | AgentError::MissingUrl | AgentError::MalformedUrl(_) => {
                PipelineError::Config(e.to_string())
            }
            AgentError::Api { status, body } => PipelineError::Upstream { stage, status, body },
            AgentError::Timeout(after) => PipelineError::Timeout {
                stage,
                after,
                hint: None,
            },
            AgentError::Http(e) => PipelineError::Transport {
                stage,
                message: e.to_string(),
            },
        }
    }
}
