use std::time::Duration;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Where and how to reach the token relay.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub relay_url: String,
    pub request_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            relay_url: "http://localhost:8080".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl GatewayConfig {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        load_dotenv();
        let defaults = Self::default();

        let relay_url = std::env::var("ATOMS_RELAY_URL").unwrap_or(defaults.relay_url);
        if !relay_url.starts_with("http://") && !relay_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "ATOMS_RELAY_URL".to_string(),
                format!("'{}' is not an http(s) URL", relay_url),
            ));
        }

        let request_timeout = match std::env::var("ATOMS_RELAY_TIMEOUT_SECS") {
            Ok(raw) => Duration::from_secs(parse_number("ATOMS_RELAY_TIMEOUT_SECS", &raw)?),
            Err(_) => defaults.request_timeout,
        };

        Ok(Self {
            relay_url,
            request_timeout,
        })
    }
}

/// Tunables for the session orchestrator.
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// How long an error stays visible before the session state is reset.
    pub error_reset_delay: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            error_reset_delay: Duration::from_secs(3),
        }
    }
}

impl OrchestratorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        load_dotenv();
        let error_reset_delay = match std::env::var("ATOMS_ERROR_RESET_MS") {
            Ok(raw) => Duration::from_millis(parse_number("ATOMS_ERROR_RESET_MS", &raw)?),
            Err(_) => Self::default().error_reset_delay,
        };
        Ok(Self { error_reset_delay })
    }
}

fn load_dotenv() {
    // Only load from .env in non-test mode to avoid contamination
    if !cfg!(test) {
        dotenvy::dotenv().ok();
    }
}

fn parse_number(var: &str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|e| ConfigError::InvalidValue(var.to_string(), e.to_string()))
}
