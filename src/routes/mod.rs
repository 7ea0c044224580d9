pub mod api_routes;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::routes::api_routes::{chat_handler, health_handler, list_models_handler};
use crate::service::chat_service::ChatService;

/// The API surface without static files, CORS or tracing.
///
/// `max_body_bytes` replaces axum's 2 MB default; chat bodies carry images.
pub fn api_router(svc: ChatService, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/api/chat", post(chat_handler).layer(DefaultBodyLimit::max(max_body_bytes)))
        .route("/api/models", get(list_models_handler))
        .route("/health", get(health_handler))
        .with_state(svc)
}

/// The full application router.
pub fn app_router(svc: ChatService, config: &AppConfig) -> Result<Router, AppError> {
    let mut app = api_router(svc, config.max_body_bytes);

    if config.static_dir.is_dir() {
        info!("Serving frontend from {}", config.static_dir.display());
        let index = config.static_dir.join("index.html");
        app = app.fallback_service(ServeDir::new(&config.static_dir).fallback(ServeFile::new(index)));
    } else {
        warn!("Static directory {} not found; serving API only", config.static_dir.display());
    }

    let origin = match &config.cors_allow_origin {
        Some(origin) => AllowOrigin::exact(origin.parse::<HeaderValue>().map_err(|_| {
            AppError::InvalidConfig { name: "CORS_ALLOW_ORIGIN".to_string(), value: origin.clone() }
        })?),
        None => AllowOrigin::any(),
    };
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Ok(app.layer(cors).layer(TraceLayer::new_for_http()))
}
