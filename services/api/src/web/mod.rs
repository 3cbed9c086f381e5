pub mod protocol;
pub mod rest;
pub mod state;

pub use rest::{
    delete_study_handler, get_study_handler, health_handler, list_studies_handler,
    put_study_handler, ApiDoc,
};
pub use state::AppState;

use axum::{
    extract::DefaultBodyLimit,
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Request bodies above this size are refused before reaching a handler.
pub const BODY_LIMIT_BYTES: usize = 2 * 1024 * 1024;

/// Builds the complete CRUD application: the `/api` routes plus the Swagger UI.
pub fn build_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/health", get(health_handler))
        .route("/studies", get(list_studies_handler))
        .route(
            "/studies/{id}",
            get(get_study_handler)
                .put(put_study_handler)
                .delete(delete_study_handler),
        )
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    Router::new()
        .nest("/api", api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
