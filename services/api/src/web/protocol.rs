//! services/api/src/web/protocol.rs
//!
//! The small JSON bodies the CRUD service answers with besides studies themselves.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Body of `GET /health`.
#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "ok")]
    pub status: String,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

/// Acknowledges a stored study.
#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct OkResponse {
    pub ok: bool,
}

/// Every failed request carries a single human-readable message.
#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
