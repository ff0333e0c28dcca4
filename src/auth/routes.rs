//! Account endpoints and per-request session resolution.

use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::{Request, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use secrecy::SecretString;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::model::Session;
use super::provider::AuthProvider;
use crate::error::AuthError;

type Reply = (StatusCode, Json<Value>);

/// Build the router for `/api/auth`.
pub fn auth_routes(auth: Arc<dyn AuthProvider>) -> Router {
    Router::new()
        .route("/api/auth/signup", post(sign_up))
        .route("/api/auth/signin", post(sign_in))
        .route("/api/auth/signout", post(sign_out))
        .route("/api/auth/me", get(me))
        .with_state(auth)
}

/// Extract the bearer token from an `Authorization` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Middleware: resolve the caller's identity once and attach it to the
/// request as a [`Session`] extension. Never rejects; handlers decide whether
/// a session is required.
pub async fn resolve_session(
    State(auth): State<Arc<dyn AuthProvider>>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = bearer_token(request.headers()).map(str::to_owned);
    let identity = match token {
        Some(token) => auth.current_user(&token).await,
        None => None,
    };
    request.extensions_mut().insert(Session(identity));
    next.run(request).await
}

#[derive(Deserialize)]
struct Credentials {
    email: String,
    password: String,
}

impl Credentials {
    fn into_parts(self) -> (String, SecretString) {
        (self.email, SecretString::from(self.password))
    }
}

fn auth_error_reply(e: &AuthError) -> Reply {
    let status = match e {
        AuthError::InvalidEmail(_) | AuthError::PasswordTooShort { .. } => StatusCode::BAD_REQUEST,
        AuthError::EmailTaken(_) => StatusCode::CONFLICT,
        AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
        AuthError::SessionTtlOutOfRange => StatusCode::INTERNAL_SERVER_ERROR,
        AuthError::Store(_) => {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"error": "Account store unavailable"})),
            );
        }
    };
    (status, Json(json!({"error": e.to_string()})))
}

fn parse_credentials(body: Result<Json<Credentials>, JsonRejection>) -> Result<Credentials, Reply> {
    body.map(|Json(c)| c).map_err(|e| {
        debug!(error = %e, "Rejected auth request body");
        (StatusCode::BAD_REQUEST, Json(json!({"error": e.body_text()})))
    })
}

async fn sign_up(
    State(auth): State<Arc<dyn AuthProvider>>,
    body: Result<Json<Credentials>, JsonRejection>,
) -> Result<Reply, Reply> {
    let (email, password) = parse_credentials(body)?.into_parts();
    let identity = auth
        .sign_up(&email, &password)
        .await
        .map_err(|e| auth_error_reply(&e))?;
    Ok((StatusCode::CREATED, Json(json!(identity))))
}

async fn sign_in(
    State(auth): State<Arc<dyn AuthProvider>>,
    body: Result<Json<Credentials>, JsonRejection>,
) -> Result<Reply, Reply> {
    let (email, password) = parse_credentials(body)?.into_parts();
    let (user, token) = auth
        .sign_in(&email, &password)
        .await
        .map_err(|e| auth_error_reply(&e))?;
    Ok((StatusCode::OK, Json(json!({"user": user, "token": token}))))
}

async fn sign_out(
    State(auth): State<Arc<dyn AuthProvider>>,
    headers: HeaderMap,
) -> Result<StatusCode, Reply> {
    if let Some(token) = bearer_token(&headers) {
        auth.sign_out(token).await.map_err(|e| auth_error_reply(&e))?;
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn me(Extension(session): Extension<Session>) -> impl IntoResponse {
    Json(json!(session.identity()))
}
