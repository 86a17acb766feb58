use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// Which pipeline produced a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Ideas,
    CaptionRegen,
    BrandAlignment,
}

impl RunKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunKind::Ideas => "ideas",
            RunKind::CaptionRegen => "caption_regen",
            RunKind::BrandAlignment => "brand_alignment",
        }
    }

    /// Only caption and brand-alignment artifacts can be excluded by a reviewer.
    pub fn supports_exclusion(&self) -> bool {
        matches!(self, RunKind::CaptionRegen | RunKind::BrandAlignment)
    }
}

impl fmt::Display for RunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ideas" => Ok(RunKind::Ideas),
            "caption_regen" => Ok(RunKind::CaptionRegen),
            "brand_alignment" => Ok(RunKind::BrandAlignment),
            other => Err(format!("unknown run kind '{other}'")),
        }
    }
}

/// pending → running → {completed | failed}. Completed and failed are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RunStatus::Pending),
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            other => Err(format!("unknown run status '{other}'")),
        }
    }
}

/// One persisted orchestration attempt (`generation_runs`).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RunRow {
    pub id: Uuid,
    pub account_id: Uuid,
    pub target_id: Uuid,
    pub kind: String,
    /// Narrows the exemplar scope below the target (ideas: `topics:<N>`).
    pub context_key: Option<String>,
    pub status: String,
    /// Observational sub-stage label; meaningful only while running.
    pub progress_marker: Option<String>,
    pub prompt_rendered: Option<String>,
    pub input_context: Value,
    /// Non-null iff status = completed.
    pub output_artifact: Option<Value>,
    pub model_used: Option<String>,
    pub excluded_from_prompt: bool,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunRow {
    pub fn run_kind(&self) -> Option<RunKind> {
        self.kind.parse().ok()
    }

    pub fn run_status(&self) -> Option<RunStatus> {
        self.status.parse().ok()
    }
}

/// Everything needed to open a run.
#[derive(Debug, Clone)]
pub struct NewRun {
    pub account_id: Uuid,
    pub target_id: Uuid,
    pub kind: RunKind,
    pub context_key: Option<String>,
    pub progress_marker: &'static str,
}

/// Terminal write for a successful run.
#[derive(Debug, Clone)]
pub struct RunCompletion {
    pub artifact: Value,
    pub prompt_rendered: Option<String>,
    pub input_context: Value,
    pub model_used: Option<String>,
}

/// Terminal write for a failed run.
#[derive(Debug, Clone)]
pub struct RunFailure {
    pub error: String,
    pub prompt_rendered: Option<String>,
    pub input_context: Value,
}
