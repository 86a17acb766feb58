//! Stage-1 conversational agent client.
//!
//! The target URL is configured per account and carries routing parameters
//! (board, chat, model) as query parameters. The credential is always the
//! server-held key: any `api_key` already present in the stored URL is dropped
//! and replaced before the request is sent.

use std::time::Duration;

use reqwest::{Client, Url};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use super::{truncate, ERROR_BODY_LIMIT};

const API_KEY_PARAM: &str = "api_key";
const MODEL_PARAM: &str = "model";

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("AGENT_API_KEY is not configured")]
    MissingApiKey,

    #[error("agent URL is not configured for this account")]
    MissingUrl,

    #[error("agent URL is malformed: {0}")]
    MalformedUrl(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("agent returned status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("request aborted after {}s", .0.as_secs())]
    Timeout(Duration),
}

#[derive(Debug, Serialize)]
struct AgentRequest<'a> {
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

/// Free-form reply of the agent plus the routing model it was addressed with.
#[derive(Debug, Clone)]
pub struct AgentReply {
    pub text: String,
    pub model: Option<String>,
}

#[derive(Clone)]
pub struct AgentClient {
    client: Client,
    api_key: Option<String>,
    timeout: Duration,
}

impl AgentClient {
    pub fn new(api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .build()
                .expect("Failed to build HTTP client"),
            api_key,
            timeout,
        }
    }

    /// Posts `prompt` to the account's agent URL and returns the raw reply text.
    pub async fn converse(&self, agent_url: Option<&str>, prompt: &str) -> Result<AgentReply, AgentError> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(AgentError::MissingApiKey)?;
        let agent_url = agent_url
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or(AgentError::MissingUrl)?;
        let (url, model) = routed_url(agent_url, api_key)?;

        match tokio::time::timeout(self.timeout, self.send(url, prompt, model.as_deref())).await {
            Ok(Ok(text)) => Ok(AgentReply { text, model }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(AgentError::Timeout(self.timeout)),
        }
    }

    async fn send(&self, url: Url, prompt: &str, model: Option<&str>) -> Result<String, AgentError> {
        debug!("Calling agent at {}", redacted(&url));

        let response = self
            .client
            .post(url)
            .json(&AgentRequest { prompt, model })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(AgentError::Api {
                status: status.as_u16(),
                body: truncate(&body, ERROR_BODY_LIMIT),
            });
        }
        Ok(body)
    }
}

/// Rebuilds the stored URL with the server credential injected and returns the
/// routing model named in its query, if any.
fn routed_url(stored: &str, api_key: &str) -> Result<(Url, Option<String>), AgentError> {
    let mut url = Url::parse(stored).map_err(|e| AgentError::MalformedUrl(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(AgentError::MalformedUrl(format!(
            "unsupported scheme '{}'",
            url.scheme()
        )));
    }

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != API_KEY_PARAM)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    let model = kept
        .iter()
        .find(|(k, v)| k == MODEL_PARAM && !v.is_empty())
        .map(|(_, v)| v.clone());

    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .append_pair(API_KEY_PARAM, api_key);

    Ok((url, model))
}

/// URL with the credential masked, for logs.
fn redacted(url: &Url) -> String {
    let mut masked = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == API_KEY_PARAM { "***".to_string() } else { v.into_owned() };
            (k.into_owned(), v)
        })
        .collect();
    masked
        .query_pairs_mut()
        .clear()
        .extend_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    masked.to_string()
}
