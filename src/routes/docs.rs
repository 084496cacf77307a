use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{services::documentation::ApiDoc, state::SharedState};

/// Swagger UI at `/docs`, raw document at `/api-doc/openapi.json`.
pub fn router(state: SharedState) -> Router<SharedState> {
    Router::<SharedState>::from(
        SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()),
    )
    .with_state(state)
}
