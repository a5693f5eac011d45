//! Relay API Models
//!
//! Request and response shapes of the relay's HTTP surface, annotated for
//! OpenAPI generation with `utoipa`.

use atoms_core::ConversationMode;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, Debug, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CreateWebCallQuery {
    /// Conversation kind to create: `webcall` or `chat`.
    #[param(value_type = String, example = "webcall")]
    pub mode: ConversationMode,
}

#[derive(Deserialize, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct CreateWebCallPayload {
    #[serde(default)]
    #[schema(example = "68a40d0d6989a10b1631501f")]
    pub agent_id: Option<String>,
    #[serde(default)]
    #[schema(example = "sk-...")]
    pub api_key: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "ok")]
    pub status: &'static str,
}
