//! Credential/Token Gateway Client
//!
//! Exchanges an agent identifier and API key for a short-lived access grant by
//! calling the relay's `create-web-call` endpoint. Requests are never retried:
//! a failed exchange is reported to the caller as-is.

use crate::{
    config::GatewayConfig,
    credentials::Credentials,
    session::ConversationMode,
};
use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, instrument, warn};

/// The token and host authorizing exactly one transport session.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct AccessGrant {
    pub token: String,
    pub host: String,
}

impl fmt::Debug for AccessGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessGrant")
            .field("token", &"[redacted]")
            .field("host", &self.host)
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Failed to get access token: {message} (HTTP {status})")]
    Status { status: u16, message: String },
    #[error("Failed to reach token relay: {0}")]
    Network(#[source] reqwest::Error),
    #[error("Malformed token relay response: {0}")]
    MalformedResponse(String),
}

/// Anything that can turn credentials into an access grant.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenGateway: Send + Sync {
    async fn request_grant(
        &self,
        credentials: &Credentials,
        mode: ConversationMode,
    ) -> Result<AccessGrant, GatewayError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WebCallRequest<'a> {
    agent_id: &'a str,
    api_key: &'a str,
}

#[derive(Deserialize)]
struct GrantEnvelope {
    data: AccessGrant,
}

#[derive(Deserialize)]
struct RelayErrorBody {
    error: String,
}

/// `TokenGateway` backed by the HTTP relay service.
#[derive(Clone)]
pub struct HttpTokenGateway {
    client: reqwest::Client,
    relay_url: String,
}

impl HttpTokenGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(GatewayError::Network)?;
        Ok(Self {
            client,
            relay_url: config.relay_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl TokenGateway for HttpTokenGateway {
    #[instrument(skip_all, fields(agent_id = %credentials.agent_id, %mode))]
    async fn request_grant(
        &self,
        credentials: &Credentials,
        mode: ConversationMode,
    ) -> Result<AccessGrant, GatewayError> {
        let url = format!("{}/create-web-call", self.relay_url);
        debug!(%url, "Requesting access grant");

        let response = self
            .client
            .post(&url)
            .query(&[("mode", mode.as_str())])
            .json(&WebCallRequest {
                agent_id: &credentials.agent_id,
                api_key: credentials.api_key.expose_secret(),
            })
            .send()
            .await
            .map_err(GatewayError::Network)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<RelayErrorBody>(&body)
                .map(|b| b.error)
                .unwrap_or_else(|_| {
                    status
                        .canonical_reason()
                        .unwrap_or("unexpected status")
                        .to_string()
                });
            warn!(status = status.as_u16(), %message, "Token relay rejected the request");
            return Err(GatewayError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let envelope: GrantEnvelope = response
            .json()
            .await
            .map_err(|e| GatewayError::MalformedResponse(e.to_string()))?;
        let grant = envelope.data;
        if grant.token.is_empty() || grant.host.is_empty() {
            return Err(GatewayError::MalformedResponse(
                "token or host is empty".to_string(),
            ));
        }

        debug!(host = %grant.host, "Access grant obtained");
        Ok(grant)
    }
}
