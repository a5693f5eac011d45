use secrecy::{ExposeSecret, SecretString};

/// The identity used to request an access grant for one agent.
///
/// The API key is held as a `SecretString` so it never shows up in `Debug`
/// output or log fields.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub agent_id: String,
    pub api_key: SecretString,
}

/// Raised before any I/O when credentials are incomplete.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Agent ID is required")]
    MissingAgentId,
    #[error("API key is required")]
    MissingApiKey,
}

impl Credentials {
    pub fn new(agent_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            api_key: SecretString::from(api_key.into()),
        }
    }

    /// Rejects blank (empty or whitespace-only) fields.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.agent_id.trim().is_empty() {
            return Err(ValidationError::MissingAgentId);
        }
        if self.api_key.expose_secret().trim().is_empty() {
            return Err(ValidationError::MissingApiKey);
        }
        Ok(())
    }
}
