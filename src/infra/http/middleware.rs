use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::application::tokens::AuthError;
use crate::domain::users::Username;

use super::error::ApiError;
use super::state::ApiState;

/// The authenticated caller, attached as a request extension.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Username);

/// Validates the `<username>.<token>` credential carried in the
/// Authorization header (with or without a `Bearer ` prefix).
pub async fn token_auth(
    State(state): State<ApiState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let credential = match extract_credential(request.headers().get(axum::http::header::AUTHORIZATION))
    {
        Some(value) => value,
        None => return ApiError::unauthorized().into_response(),
    };

    let username = match state.tokens.validate(&credential).await {
        Ok(username) => username,
        Err(AuthError::Repo(_)) => return ApiError::store_unavailable().into_response(),
        // Malformed, unknown and invalid all collapse into one response.
        Err(_) => return ApiError::unauthorized().into_response(),
    };

    request.extensions_mut().insert(AuthUser(username));
    next.run(request).await
}

fn extract_credential(header: Option<&axum::http::HeaderValue>) -> Option<String> {
    let raw = header?.to_str().ok()?;
    let raw = raw.strip_prefix("Bearer ").unwrap_or(raw);
    if raw.is_empty() {
        return None;
    }
    Some(raw.to_string())
}
