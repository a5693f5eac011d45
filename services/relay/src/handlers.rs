//! Axum Handlers for the Relay API
//!
//! This module contains the logic for handling token requests. It uses
//! `utoipa` doc comments to generate OpenAPI documentation.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use atoms_core::ConversationMode;
use secrecy::SecretString;
use std::sync::Arc;
use tracing::{error, info, instrument};

use crate::{
    models::{CreateWebCallPayload, CreateWebCallQuery, ErrorResponse, HealthResponse},
    state::AppState,
};

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    UpstreamFailed(ConversationMode),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(error) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { error })).into_response()
            }
            ApiError::UpstreamFailed(mode) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Failed to create {}", mode),
                }),
            )
                .into_response(),
        }
    }
}

fn required(value: Option<String>, field: &str) -> Result<String, ApiError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest(format!("{} is required", field)))
}

/// Create a web call or chat conversation and return its access token.
#[utoipa::path(
    post,
    path = "/create-web-call",
    request_body = CreateWebCallPayload,
    params(CreateWebCallQuery),
    responses(
        (status = 201, description = "Conversation created; upstream response echoed", body = serde_json::Value),
        (status = 400, description = "Missing agentId or apiKey", body = ErrorResponse),
        (status = 500, description = "Upstream failure", body = ErrorResponse)
    )
)]
#[instrument(skip_all, fields(mode = %query.mode))]
pub async fn create_web_call(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CreateWebCallQuery>,
    Json(payload): Json<CreateWebCallPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let agent_id = required(payload.agent_id, "agentId")?;
    let api_key = SecretString::from(required(payload.api_key, "apiKey")?);

    match state
        .upstream
        .create_conversation(query.mode, &agent_id, &api_key)
        .await
    {
        Ok(body) => {
            info!(%agent_id, "Conversation created");
            Ok((StatusCode::CREATED, Json(body)))
        }
        Err(e) => {
            error!(%agent_id, error = %e, "Error creating {}", query.mode);
            Err(ApiError::UpstreamFailed(query.mode))
        }
    }
}

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::{MockUpstreamClient, UpstreamError};
    use secrecy::ExposeSecret;
    use serde_json::{Value, json};

    fn state_with(upstream: MockUpstreamClient) -> Arc<AppState> {
        Arc::new(AppState {
            upstream: Arc::new(upstream),
        })
    }

    fn payload(agent_id: Option<&str>, api_key: Option<&str>) -> CreateWebCallPayload {
        CreateWebCallPayload {
            agent_id: agent_id.map(str::to_string),
            api_key: api_key.map(str::to_string),
        }
    }

    async fn call(
        state: Arc<AppState>,
        mode: ConversationMode,
        body: CreateWebCallPayload,
    ) -> (StatusCode, Value) {
        let response = create_web_call(
            State(state),
            Query(CreateWebCallQuery { mode }),
            Json(body),
        )
        .await
        .into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_success_echoes_upstream_with_created() {
        let mut upstream = MockUpstreamClient::new();
        upstream
            .expect_create_conversation()
            .withf(|mode, agent_id, api_key| {
                *mode == ConversationMode::TextChat
                    && agent_id == "agent-1"
                    && api_key.expose_secret() == "key-1"
            })
            .times(1)
            .returning(|_, _, _| Ok(json!({ "data": { "token": "t1", "host": "h1" } })));

        let (status, body) = call(
            state_with(upstream),
            ConversationMode::TextChat,
            payload(Some("agent-1"), Some("key-1")),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body, json!({ "data": { "token": "t1", "host": "h1" } }));
    }

    #[tokio::test]
    async fn test_blank_credentials_are_rejected() {
        let mut upstream = MockUpstreamClient::new();
        upstream.expect_create_conversation().never();
        let state = state_with(upstream);

        let (status, body) = call(
            state.clone(),
            ConversationMode::VoiceCall,
            payload(Some("  "), Some("key")),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "agentId is required" }));

        let (status, body) = call(
            state,
            ConversationMode::VoiceCall,
            payload(Some("agent"), None),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "apiKey is required" }));
    }

    #[tokio::test]
    async fn test_upstream_failure_maps_to_500() {
        let mut upstream = MockUpstreamClient::new();
        upstream.expect_create_conversation().returning(|_, _, _| {
            Err(UpstreamError::Status {
                status: 403,
                body: "forbidden".into(),
            })
        });

        let (status, body) = call(
            state_with(upstream),
            ConversationMode::VoiceCall,
            payload(Some("agent"), Some("key")),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "error": "Failed to create webcall" }));
    }

    #[tokio::test]
    async fn test_health() {
        let Json(body) = health().await;
        assert_eq!(body.status, "ok");
    }
}
