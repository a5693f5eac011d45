//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the relay, including the
//! token endpoint and OpenAPI documentation.

use crate::{
    handlers,
    models::{CreateWebCallPayload, ErrorResponse, HealthResponse},
    state::AppState,
};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(handlers::create_web_call, handlers::health),
    components(schemas(CreateWebCallPayload, ErrorResponse, HealthResponse)),
    tags(
        (name = "Atoms Relay", description = "Access token relay for real-time agent conversations")
    )
)]
pub struct ApiDoc;

/// The relay's OpenAPI document as pretty-printed JSON.
pub fn openapi_json() -> Result<String, serde_json::Error> {
    ApiDoc::openapi().to_pretty_json()
}

/// Creates the main Axum router for the relay.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/create-web-call", post(handlers::create_web_call))
        .route("/health", get(handlers::health))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
