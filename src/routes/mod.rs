use axum::http::HeaderValue;
use axum::{extract::DefaultBodyLimit, routing::get, routing::post, Router};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub mod health;
pub mod oficios;

pub fn create_router(state: AppState) -> Router<()> {
    let cors = build_cors(state.config.cors_allowed_origin.as_deref());
    let body_limit = state.config.max_upload_bytes;

    let mut router = Router::new()
        .route("/", get(oficios::index))
        .route(
            "/agregar",
            get(oficios::new_form).post(oficios::create_oficio),
        )
        .route(
            "/editar/:id",
            get(oficios::edit_form).post(oficios::update_oficio),
        )
        .route("/eliminar/:id", post(oficios::delete_oficio))
        .route("/api/health", get(health::health_check));

    if let Some(uploads_dir) = state.config.storage.uploads_dir() {
        router = router.nest_service("/uploads", ServeDir::new(uploads_dir));
    }

    router
        .with_state(state)
        .layer(cors)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
}

fn build_cors(allowed_origins: Option<&str>) -> CorsLayer {
    let allow_origin = match allowed_origins {
        Some(origins) => {
            let headers: Vec<HeaderValue> = origins
                .split(',')
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .filter_map(|value| match value.parse::<HeaderValue>() {
                    Ok(header) => Some(header),
                    Err(_) => {
                        tracing::warn!(origin = %value, "ignoring invalid CORS allowed origin");
                        None
                    }
                })
                .collect();
            AllowOrigin::list(headers)
        }
        None => AllowOrigin::mirror_request(),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(tower_http::cors::AllowMethods::mirror_request())
        .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
        .allow_credentials(true)
}
