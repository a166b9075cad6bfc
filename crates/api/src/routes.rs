use axum::{
    error_handling::HandleErrorLayer,
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    routing::{get, post},
    BoxError, Router,
};
use codeshelf_core::GatewayConfig;
use std::sync::Arc;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower::ServiceBuilder;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::{codebases, health, proxy, upload, ApiError, AppState};

/// All gateway routes, bound to `state`
pub fn create_router(state: Arc<AppState>) -> Router {
    let upload_limit = state.max_upload_bytes;

    Router::new()
        .route(
            "/upload",
            post(upload::upload_codebase).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/codebases", get(codebases::list_codebases))
        .route("/codebases/{id}", get(codebases::get_codebase_files))
        .route("/codebases/{id}/metadata", get(codebases::get_file_metadata))
        .route("/codebases/{id}/content", get(proxy::read_file_content))
        .route("/codebases/{id}/download", get(proxy::download_file))
        .route("/codebases/{id}/zip", get(proxy::download_zip))
        .route("/health", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .with_state(state)
}

/// Wrap the router with the process-wide layers and the optional static UI
pub fn apply_middleware(router: Router, config: &GatewayConfig) -> Router {
    let router = match &config.static_dir {
        Some(dir) => {
            tracing::info!("Serving static files from {}", dir.display());
            router.fallback_service(ServeDir::new(dir))
        }
        None => router,
    };

    router
        // Request timeout, rendered in the common JSON error shape
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_middleware_error))
                .timeout(config.request_timeout),
        )
        // One semaphore shared by every route, so the cap is process-wide
        .layer(GlobalConcurrencyLimitLayer::new(config.max_concurrent_requests))
        .layer(configure_cors(&config.cors_allowed_origins))
        .layer(TraceLayer::new_for_http())
}

async fn handle_middleware_error(err: BoxError) -> ApiError {
    if err.is::<tower::timeout::error::Elapsed>() {
        ApiError::Timeout("Request timed out".to_string())
    } else {
        tracing::error!("Unhandled middleware error: {}", err);
        ApiError::Internal("Internal server error".to_string())
    }
}

/// CORS for the browser upload page
///
/// An empty allow-list accepts any origin.
fn configure_cors(allowed_origins: &[String]) -> CorsLayer {
    let allowed_methods = AllowMethods::list([Method::GET, Method::POST, Method::OPTIONS]);
    let allowed_headers = AllowHeaders::list([header::CONTENT_TYPE]);

    let allow_origin = if allowed_origins.is_empty() {
        tracing::info!("CORS: allowing any origin");
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!("CORS: ignoring invalid origin {:?}", origin);
                    None
                }
            })
            .collect();
        tracing::info!("CORS: {} allowed origins", origins.len());
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(allowed_methods)
        .allow_headers(allowed_headers)
        .max_age(std::time::Duration::from_secs(3600))
}
