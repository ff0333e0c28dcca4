//! HTTP application assembly: routes, session middleware, CORS.

use std::sync::Arc;

use axum::{
    Json, Router,
    http::HeaderValue,
    middleware,
    response::IntoResponse,
    routing::get,
};
use tower_http::cors::{Any, CorsLayer};

use crate::auth::{AuthProvider, auth_routes, resolve_session, session_ws_routes};
use crate::error::ConfigError;
use crate::logs::{LogService, log_routes};

/// Shared services behind the HTTP surface.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<dyn AuthProvider>,
    pub logs: Arc<LogService>,
}

/// Build the full application router.
pub fn build_router(state: AppState, cors_origin: Option<&str>) -> Result<Router, ConfigError> {
    let cors = cors_layer(cors_origin)?;

    Ok(Router::new()
        .route("/health", get(health))
        .merge(auth_routes(Arc::clone(&state.auth)))
        .merge(log_routes(Arc::clone(&state.logs)))
        .merge(session_ws_routes(Arc::clone(&state.auth)))
        .layer(middleware::from_fn_with_state(state.auth, resolve_session))
        .layer(cors))
}

fn cors_layer(origin: Option<&str>) -> Result<CorsLayer, ConfigError> {
    let Some(origin) = origin else {
        return Ok(CorsLayer::permissive());
    };
    let origin = origin
        .parse::<HeaderValue>()
        .map_err(|e| ConfigError::InvalidValue {
            key: "SHUTDOWN_LOG_CORS_ORIGIN".to_string(),
            message: e.to_string(),
        })?;
    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(Any)
        .allow_headers(Any))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}
