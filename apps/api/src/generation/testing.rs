//! In-memory stores and a mocked-upstream harness for pipeline tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use uuid::Uuid;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::generation::lifecycle::markers;
use crate::generation::Orchestrator;
use crate::llm_client::{AgentClient, LlmClient};
use crate::models::run::{NewRun, RunCompletion, RunFailure, RunKind, RunRow};
use crate::models::workspace::{AccountRouting, Project, SourceContent};
use crate::store::{RunStore, StoreError, WorkspaceStore, ABANDONED_ERROR};

/// Body of a successful structured-completion response carrying `text`.
pub fn completion_body(text: &str) -> Value {
    json!({
        "id": "msg_test",
        "content": [{"type": "text", "text": text}],
        "model": "claude-sonnet-4-5",
        "usage": {"input_tokens": 10, "output_tokens": 20}
    })
}

/// An orchestrator wired to in-memory stores and a mock completion endpoint.
pub struct Harness {
    pub runs: Arc<MemoryRunStore>,
    pub workspace: Arc<MemoryWorkspaceStore>,
    pub llm_server: MockServer,
    pub orchestrator: Orchestrator,
}

impl Harness {
    pub async fn start<F>(seed: F) -> Self
    where
        F: FnOnce(MemoryWorkspaceStore) -> MemoryWorkspaceStore,
    {
        let llm_server = MockServer::start().await;
        let runs = Arc::new(MemoryRunStore::default());
        let workspace = Arc::new(seed(MemoryWorkspaceStore::default()));
        let orchestrator = Orchestrator::new(
            runs.clone(),
            workspace.clone(),
            LlmClient::with_endpoint(Some("sk-test".to_string()), llm_server.uri()),
            AgentClient::new(Some("agent-key".to_string()), std::time::Duration::from_secs(5)),
        );
        Self {
            runs,
            workspace,
            llm_server,
            orchestrator,
        }
    }

    pub async fn respond_with_completion(&self, text: &str) {
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(text)))
            .mount(&self.llm_server)
            .await;
    }

    /// The prompt text of the `n`th completion request received.
    pub async fn completion_prompt(&self, n: usize) -> String {
        let requests = self.llm_server.received_requests().await.unwrap_or_default();
        let body: Value = serde_json::from_slice(&requests[n].body).unwrap();
        body["messages"][0]["content"].as_str().unwrap_or_default().to_string()
    }
}

fn unavailable() -> StoreError {
    StoreError::Database(sqlx::Error::PoolTimedOut)
}

/// Mirrors `PgRunStore`, including stale-run reaping on `create_run`.
pub struct MemoryRunStore {
    rows: Mutex<Vec<RunRow>>,
    stale_after: Duration,
    fail_progress: AtomicBool,
    fail_completion: AtomicBool,
}

impl Default for MemoryRunStore {
    fn default() -> Self {
        Self::with_stale_after_minutes(15)
    }
}

impl MemoryRunStore {
    pub fn with_stale_after_minutes(minutes: i64) -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            stale_after: Duration::minutes(minutes),
            fail_progress: AtomicBool::new(false),
            fail_completion: AtomicBool::new(false),
        }
    }

    pub fn rows(&self) -> Vec<RunRow> {
        self.rows.lock().unwrap().clone()
    }

    pub fn row(&self, id: Uuid) -> Option<RunRow> {
        self.rows().into_iter().find(|r| r.id == id)
    }

    pub fn fail_progress_writes(&self, fail: bool) {
        self.fail_progress.store(fail, Ordering::SeqCst);
    }

    pub fn fail_completion_writes(&self, fail: bool) {
        self.fail_completion.store(fail, Ordering::SeqCst);
    }

    /// Seeds a completed run `age_minutes` old with the given artifact.
    pub fn seed_completed(
        &self,
        account_id: Uuid,
        target_id: Uuid,
        kind: RunKind,
        context_key: Option<&str>,
        artifact: Value,
        excluded: bool,
        age_minutes: i64,
    ) -> Uuid {
        let created_at = Utc::now() - Duration::minutes(age_minutes);
        let row = RunRow {
            id: Uuid::new_v4(),
            account_id,
            target_id,
            kind: kind.as_str().to_string(),
            context_key: context_key.map(str::to_string),
            status: "completed".to_string(),
            progress_marker: None,
            prompt_rendered: Some("seeded".to_string()),
            input_context: json!({}),
            output_artifact: Some(artifact),
            model_used: None,
            excluded_from_prompt: excluded,
            error: None,
            created_at,
            finished_at: Some(created_at),
        };
        let id = row.id;
        self.rows.lock().unwrap().push(row);
        id
    }

    /// Seeds a run still marked running, opened `age_minutes` ago.
    pub fn seed_running(
        &self,
        account_id: Uuid,
        target_id: Uuid,
        kind: RunKind,
        context_key: Option<&str>,
        age_minutes: i64,
    ) -> Uuid {
        let row = RunRow {
            id: Uuid::new_v4(),
            account_id,
            target_id,
            kind: kind.as_str().to_string(),
            context_key: context_key.map(str::to_string),
            status: "running".to_string(),
            progress_marker: Some(markers::CALLING_STAGE_2.to_string()),
            prompt_rendered: None,
            input_context: json!({}),
            output_artifact: None,
            model_used: None,
            excluded_from_prompt: false,
            error: None,
            created_at: Utc::now() - Duration::minutes(age_minutes),
            finished_at: None,
        };
        let id = row.id;
        self.rows.lock().unwrap().push(row);
        id
    }

    /// Seeds a failed run (no artifact).
    pub fn seed_failed(&self, account_id: Uuid, target_id: Uuid, kind: RunKind) -> Uuid {
        let now = Utc::now() - Duration::minutes(1);
        let row = RunRow {
            id: Uuid::new_v4(),
            account_id,
            target_id,
            kind: kind.as_str().to_string(),
            context_key: None,
            status: "failed".to_string(),
            progress_marker: None,
            prompt_rendered: None,
            input_context: json!({}),
            output_artifact: None,
            model_used: None,
            excluded_from_prompt: false,
            error: Some("seeded failure".to_string()),
            created_at: now,
            finished_at: Some(now),
        };
        let id = row.id;
        self.rows.lock().unwrap().push(row);
        id
    }

    fn update_running<F>(&self, run_id: Uuid, apply: F) -> Result<RunRow, StoreError>
    where
        F: FnOnce(&mut RunRow),
    {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|r| r.id == run_id && r.status == "running")
            .ok_or(StoreError::NotRunning(run_id))?;
        apply(row);
        Ok(row.clone())
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn create_run(&self, new_run: &NewRun) -> Result<RunRow, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let now = Utc::now();
        let same_slot = |r: &RunRow| {
            r.status == "running"
                && r.kind == new_run.kind.as_str()
                && r.target_id == new_run.target_id
                && r.context_key == new_run.context_key
        };
        for row in rows.iter_mut() {
            if same_slot(&*row) && row.created_at < now - self.stale_after {
                row.status = "failed".to_string();
                row.error = Some(ABANDONED_ERROR.to_string());
                row.progress_marker = None;
                row.finished_at = Some(now);
            }
        }
        let busy = rows.iter().any(|r| same_slot(r));
        if busy {
            return Err(StoreError::ActiveRun {
                kind: new_run.kind,
                target_id: new_run.target_id,
            });
        }
        let row = RunRow {
            id: Uuid::new_v4(),
            account_id: new_run.account_id,
            target_id: new_run.target_id,
            kind: new_run.kind.as_str().to_string(),
            context_key: new_run.context_key.clone(),
            status: "running".to_string(),
            progress_marker: Some(new_run.progress_marker.to_string()),
            prompt_rendered: None,
            input_context: json!({}),
            output_artifact: None,
            model_used: None,
            excluded_from_prompt: false,
            error: None,
            created_at: now,
            finished_at: None,
        };
        rows.push(row.clone());
        Ok(row)
    }

    async fn set_progress(&self, run_id: Uuid, marker: &str) -> Result<(), StoreError> {
        if self.fail_progress.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.update_running(run_id, |r| r.progress_marker = Some(marker.to_string()))
            .map(|_| ())
    }

    async fn complete_run(&self, run_id: Uuid, completion: &RunCompletion) -> Result<RunRow, StoreError> {
        if self.fail_completion.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.update_running(run_id, |r| {
            r.status = "completed".to_string();
            r.output_artifact = Some(completion.artifact.clone());
            r.prompt_rendered = completion.prompt_rendered.clone();
            r.input_context = completion.input_context.clone();
            r.model_used = completion.model_used.clone();
            r.error = None;
            r.progress_marker = None;
            r.finished_at = Some(Utc::now());
        })
    }

    async fn fail_run(&self, run_id: Uuid, failure: &RunFailure) -> Result<RunRow, StoreError> {
        self.update_running(run_id, |r| {
            r.status = "failed".to_string();
            r.error = Some(failure.error.clone());
            if failure.prompt_rendered.is_some() {
                r.prompt_rendered = failure.prompt_rendered.clone();
            }
            r.input_context = failure.input_context.clone();
            r.output_artifact = None;
            r.progress_marker = None;
            r.finished_at = Some(Utc::now());
        })
    }

    async fn get_run(&self, account_id: Uuid, run_id: Uuid) -> Result<Option<RunRow>, StoreError> {
        Ok(self
            .rows()
            .into_iter()
            .find(|r| r.id == run_id && r.account_id == account_id))
    }

    async fn list_runs(
        &self,
        account_id: Uuid,
        target_id: Uuid,
        kind: Option<RunKind>,
    ) -> Result<Vec<RunRow>, StoreError> {
        let mut rows: Vec<RunRow> = self
            .rows()
            .into_iter()
            .filter(|r| r.account_id == account_id && r.target_id == target_id)
            .filter(|r| kind.map_or(true, |k| r.kind == k.as_str()))
            .collect();
        rows.sort_by_key(|r| r.created_at);
        Ok(rows)
    }

    async fn exemplar_runs(
        &self,
        account_id: Uuid,
        target_id: Uuid,
        kind: RunKind,
        context_key: Option<&str>,
    ) -> Result<Vec<RunRow>, StoreError> {
        let mut rows: Vec<RunRow> = self
            .rows()
            .into_iter()
            .filter(|r| {
                r.account_id == account_id
                    && r.target_id == target_id
                    && r.kind == kind.as_str()
                    && r.context_key.as_deref() == context_key
                    && r.status == "completed"
                    && r.output_artifact.is_some()
                    && !r.excluded_from_prompt
            })
            .collect();
        rows.sort_by_key(|r| r.created_at);
        Ok(rows)
    }

    async fn set_excluded(
        &self,
        account_id: Uuid,
        run_id: Uuid,
        excluded: bool,
    ) -> Result<Option<RunRow>, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        Ok(rows
            .iter_mut()
            .find(|r| {
                r.id == run_id
                    && r.account_id == account_id
                    && r.status == "completed"
                    && r.run_kind().is_some_and(|k| k.supports_exclusion())
            })
            .map(|r| {
                r.excluded_from_prompt = excluded;
                r.clone()
            }))
    }
}

#[derive(Default)]
pub struct MemoryWorkspaceStore {
    pub routing: Mutex<Vec<AccountRouting>>,
    pub templates: Mutex<Vec<(Uuid, String, String)>>,
    pub sources: Mutex<Vec<SourceContent>>,
    pub projects: Mutex<Vec<Project>>,
    fail_caption_writes: AtomicBool,
}

impl MemoryWorkspaceStore {
    pub fn with_routing(self, routing: AccountRouting) -> Self {
        self.routing.lock().unwrap().push(routing);
        self
    }

    pub fn with_source(self, source: SourceContent) -> Self {
        self.sources.lock().unwrap().push(source);
        self
    }

    pub fn with_project(self, project: Project) -> Self {
        self.projects.lock().unwrap().push(project);
        self
    }

    pub fn with_template(self, account_id: Uuid, name: &str, body: &str) -> Self {
        self.templates
            .lock()
            .unwrap()
            .push((account_id, name.to_string(), body.to_string()));
        self
    }

    pub fn fail_caption_writes(&self, fail: bool) {
        self.fail_caption_writes.store(fail, Ordering::SeqCst);
    }

    pub fn project_caption(&self, project_id: Uuid) -> Option<String> {
        self.projects
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == project_id)
            .and_then(|p| p.caption.clone())
    }
}

#[async_trait]
impl WorkspaceStore for MemoryWorkspaceStore {
    async fn routing(&self, account_id: Uuid) -> Result<Option<AccountRouting>, StoreError> {
        Ok(self
            .routing
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.account_id == account_id)
            .cloned())
    }

    async fn template_override(&self, account_id: Uuid, name: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .templates
            .lock()
            .unwrap()
            .iter()
            .find(|(a, n, _)| *a == account_id && n == name)
            .map(|(_, _, body)| body.clone()))
    }

    async fn source_content(&self, account_id: Uuid, source_id: Uuid) -> Result<Option<SourceContent>, StoreError> {
        Ok(self
            .sources
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.id == source_id && s.account_id == account_id)
            .cloned())
    }

    async fn project(&self, account_id: Uuid, project_id: Uuid) -> Result<Option<Project>, StoreError> {
        Ok(self
            .projects
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == project_id && p.account_id == account_id)
            .cloned())
    }

    async fn set_project_caption(
        &self,
        account_id: Uuid,
        project_id: Uuid,
        caption: &str,
    ) -> Result<(), StoreError> {
        if self.fail_caption_writes.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        let mut projects = self.projects.lock().unwrap();
        let project = projects
            .iter_mut()
            .find(|p| p.id == project_id && p.account_id == account_id)
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))?;
        project.caption = Some(caption.to_string());
        Ok(())
    }
}
