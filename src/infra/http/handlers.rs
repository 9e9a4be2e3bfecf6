use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::revisions::Namespace;

use super::error::{ApiError, cache_error_to_api, token_error_to_api};
use super::middleware::AuthUser;
use super::state::ApiState;

pub async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}

#[derive(Debug, Deserialize)]
pub struct IssueTokenRequest {
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct IssueTokenResponse {
    pub username: String,
    /// Full `<username>.<token>` credential; shown exactly once.
    pub token: String,
}

pub async fn issue_token(
    State(state): State<ApiState>,
    Json(request): Json<IssueTokenRequest>,
) -> Result<Json<IssueTokenResponse>, ApiError> {
    let issued = state
        .tokens
        .issue(&request.username)
        .await
        .map_err(token_error_to_api)?;

    info!(username = %issued.username, "issued token");
    Ok(Json(IssueTokenResponse {
        token: issued.credential(),
        username: issued.username.to_string(),
    }))
}

pub async fn get_config(
    State(state): State<ApiState>,
    Extension(AuthUser(username)): Extension<AuthUser>,
    Path(application): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let namespace = Namespace::new(username.as_str(), &application);
    let body = state
        .cache
        .get(&namespace)
        .await
        .map_err(cache_error_to_api)?;
    Ok(Json(body))
}

pub async fn create_config(
    State(state): State<ApiState>,
    Extension(AuthUser(username)): Extension<AuthUser>,
    Path(application): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> Result<StatusCode, ApiError> {
    let namespace = Namespace::new(username.as_str(), &application);
    state
        .cache
        .create(&namespace, body)
        .await
        .map_err(cache_error_to_api)?;
    info!(namespace = %namespace, "created config");
    Ok(StatusCode::CREATED)
}

pub async fn update_config(
    State(state): State<ApiState>,
    Extension(AuthUser(username)): Extension<AuthUser>,
    Path(application): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> Result<StatusCode, ApiError> {
    let namespace = Namespace::new(username.as_str(), &application);
    state
        .cache
        .update(&namespace, body)
        .await
        .map_err(cache_error_to_api)?;
    Ok(StatusCode::OK)
}

pub async fn delete_config(
    State(state): State<ApiState>,
    Extension(AuthUser(username)): Extension<AuthUser>,
    Path(application): Path<String>,
) -> Result<StatusCode, ApiError> {
    let namespace = Namespace::new(username.as_str(), &application);
    state
        .cache
        .delete(&namespace)
        .await
        .map_err(cache_error_to_api)?;
    info!(namespace = %namespace, "deleted config");
    Ok(StatusCode::NO_CONTENT)
}
