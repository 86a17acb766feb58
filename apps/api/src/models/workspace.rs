//! Collaborator records owned by the surrounding system. Read-mostly.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Per-account routing and brand configuration.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AccountRouting {
    pub account_id: Uuid,
    /// Stage-1 agent URL with routing query parameters. Never trusted for credentials.
    pub agent_url: Option<String>,
    pub brand_guidelines: Option<String>,
    pub brand_voice: Option<String>,
}

/// Source material that topic ideas are generated from.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SourceContent {
    pub id: Uuid,
    pub account_id: Uuid,
    pub title: String,
    pub body: String,
}

/// A six-slide carousel project with its current caption.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Project {
    pub id: Uuid,
    pub account_id: Uuid,
    pub title: String,
    pub slides: Vec<String>,
    pub caption: Option<String>,
}
