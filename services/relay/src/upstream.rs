//! Upstream Conversation API Client
//!
//! Creates web-call and chat conversations on the upstream provider on behalf
//! of a caller. The caller's API key is forwarded as the bearer credential.

use async_trait::async_trait;
use atoms_core::ConversationMode;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("upstream request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Anything that can create a conversation on the upstream API.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Creates a conversation and returns the upstream's JSON response verbatim.
    async fn create_conversation(
        &self,
        mode: ConversationMode,
        agent_id: &str,
        api_key: &SecretString,
    ) -> Result<Value, UpstreamError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateConversationBody<'a> {
    agent_id: &'a str,
}

/// `UpstreamClient` for the Atoms conversation API.
pub struct AtomsUpstream {
    client: reqwest::Client,
    base_url: String,
}

impl AtomsUpstream {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl UpstreamClient for AtomsUpstream {
    #[instrument(skip(self, api_key), fields(%mode))]
    async fn create_conversation(
        &self,
        mode: ConversationMode,
        agent_id: &str,
        api_key: &SecretString,
    ) -> Result<Value, UpstreamError> {
        let url = format!("{}/conversation/{}", self.base_url, mode);
        debug!(%url, "Creating upstream conversation");

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key.expose_secret())
            .json(&CreateConversationBody { agent_id })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<Value>().await?)
    }
}
