//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the study CRUD endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::protocol::{ErrorResponse, HealthResponse, OkResponse};
use crate::web::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::Json,
};
use research_interview_core::domain::{
    Insight, KeyNeed, Message, MessageRole, Need, Participant, Priority, Study, Theme,
};
use research_interview_core::ports::PortError;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::OpenApi;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        list_studies_handler,
        get_study_handler,
        put_study_handler,
        delete_study_handler,
    ),
    components(
        schemas(
            Study, Theme, Participant, Message, MessageRole, Need, Priority, Insight, KeyNeed,
            HealthResponse, OkResponse, ErrorResponse
        )
    ),
    tags(
        (name = "User Research API", description = "Storage for research studies and their interviews.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Error Mapping
//=========================================================================================

/// What every handler returns on failure.
pub type Failure = (StatusCode, Json<ErrorResponse>);

fn failure(status: StatusCode, message: impl Into<String>) -> Failure {
    (status, Json(ErrorResponse::new(message)))
}

fn port_failure(action: &str, e: PortError) -> Failure {
    match e {
        PortError::NotFound(message) => failure(StatusCode::NOT_FOUND, message),
        PortError::InvalidPayload(message) => {
            warn!("Rejected request to {}: {}", action, message);
            failure(StatusCode::BAD_REQUEST, message)
        }
        other => {
            error!("Failed to {}: {:?}", action, other);
            failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to {}", action),
            )
        }
    }
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Liveness check.
#[utoipa::path(
    get,
    path = "/api/health",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}

/// List every study, most recently updated first.
#[utoipa::path(
    get,
    path = "/api/studies",
    responses(
        (status = 200, description = "All stored studies", body = [Study]),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn list_studies_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<Vec<Study>>, Failure> {
    let studies = app_state
        .store
        .load_all()
        .await
        .map_err(|e| port_failure("list studies", e))?;
    Ok(Json(studies))
}

/// Fetch one study.
#[utoipa::path(
    get,
    path = "/api/studies/{id}",
    params(("id" = String, Path, description = "The study id.")),
    responses(
        (status = 200, description = "The stored study", body = Study),
        (status = 404, description = "No study with this id", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn get_study_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Study>, Failure> {
    match app_state.store.load(&id).await {
        Ok(Some(study)) => Ok(Json(study)),
        Ok(None) => Err(failure(StatusCode::NOT_FOUND, "Study not found")),
        Err(e) => Err(port_failure("load study", e)),
    }
}

/// Create or replace a study.
///
/// The body is a whole study whose `id` must equal the path id. A missing or
/// non-numeric `createdAt` is filled from the stored study, or with the current
/// time for a new one. `updatedAt` is always set by the server.
#[utoipa::path(
    put,
    path = "/api/studies/{id}",
    params(("id" = String, Path, description = "The study id.")),
    request_body(content = Study, description = "The full study document."),
    responses(
        (status = 200, description = "Study stored", body = OkResponse),
        (status = 400, description = "Invalid study payload or id mismatch", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn put_study_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<OkResponse>, Failure> {
    let invalid = || failure(StatusCode::BAD_REQUEST, "Invalid study payload or id mismatch");

    let Json(mut body) = payload.map_err(|e| {
        warn!("Unreadable study body for {}: {}", id, e.body_text());
        invalid()
    })?;
    let object = body.as_object_mut().ok_or_else(invalid)?;
    if object.get("id").and_then(Value::as_str) != Some(id.as_str()) {
        return Err(invalid());
    }

    let now = app_state.clock.now();
    if !object.get("createdAt").is_some_and(Value::is_number) {
        let existing = app_state
            .store
            .load(&id)
            .await
            .map_err(|e| port_failure("load study", e))?;
        let created_at = existing.map_or(now, |s| s.created_at);
        object.insert("createdAt".to_string(), Value::from(created_at.timestamp_millis()));
    }
    object.insert("updatedAt".to_string(), Value::from(now.timestamp_millis()));

    let study: Study = serde_json::from_value(body).map_err(|e| {
        warn!("Study {} does not match the study shape: {}", id, e);
        failure(
            StatusCode::BAD_REQUEST,
            format!("Invalid study payload: {}", e),
        )
    })?;

    app_state
        .store
        .save(&study)
        .await
        .map_err(|e| port_failure("save study", e))?;
    info!("Stored study {}", study.id);
    Ok(Json(OkResponse { ok: true }))
}

/// Delete a study. Deleting a missing study also succeeds.
#[utoipa::path(
    delete,
    path = "/api/studies/{id}",
    params(("id" = String, Path, description = "The study id.")),
    responses(
        (status = 204, description = "Study deleted"),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn delete_study_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, Failure> {
    app_state
        .store
        .delete(&id)
        .await
        .map_err(|e| port_failure("delete study", e))?;
    info!("Deleted study {}", id);
    Ok(StatusCode::NO_CONTENT)
}
