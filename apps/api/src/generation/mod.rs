// Generative-content orchestration.
// Three pipelines (topic ideas, caption regeneration, brand alignment) share one
// sequence: open run → render prompt → external call(s) → extract → validate →
// finalize run. All outbound calls go through llm_client.

pub mod brand_alignment;
pub mod caption;
pub mod error;
pub mod exemplars;
pub mod handlers;
pub mod ideas;
pub mod lifecycle;
pub mod prompts;
pub mod render;
pub mod schema;
pub mod verdict;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use uuid::Uuid;

use crate::generation::error::PipelineError;
use crate::llm_client::{AgentClient, LlmClient};
use crate::store::{RunStore, WorkspaceStore};

/// Entry point for all three pipelines. Cheap to clone.
#[derive(Clone)]
pub struct Orchestrator {
    runs: Arc<dyn RunStore>,
    workspace: Arc<dyn WorkspaceStore>,
    llm: LlmClient,
    agent: AgentClient,
}

impl Orchestrator {
    pub fn new(
        runs: Arc<dyn RunStore>,
        workspace: Arc<dyn WorkspaceStore>,
        llm: LlmClient,
        agent: AgentClient,
    ) -> Self {
        Self {
            runs,
            workspace,
            llm,
            agent,
        }
    }

    pub fn runs(&self) -> &dyn RunStore {
        self.runs.as_ref()
    }

    /// The account's override for `name`, or `default`.
    async fn template(&self, account_id: Uuid, name: &str, default: &str) -> Result<String, PipelineError> {
        Ok(self
            .workspace
            .template_override(account_id, name)
            .await?
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| default.to_string()))
    }
}
