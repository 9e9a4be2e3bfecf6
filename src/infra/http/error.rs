use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::warn;

use crate::application::cache::CacheError;
use crate::application::tokens::TokenError;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorMessage,
}

pub mod codes {
    pub const BAD_REQUEST: &str = "bad_request";
    pub const UNAUTHORIZED: &str = "unauthorized";
    pub const INVALID_USERNAME: &str = "invalid_username";
    pub const DUPLICATE_USER: &str = "duplicate_user";
    pub const CONFIG_NOT_FOUND: &str = "config_not_found";
    pub const CONFIG_ALREADY_EXISTS: &str = "config_already_exists";
    pub const DELETE_FAILED: &str = "delete_failed";
    pub const STORE_UNAVAILABLE: &str = "store_unavailable";
}

#[derive(Debug, Serialize)]
pub struct ApiErrorMessage {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: &'static str,
    hint: Option<String>,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        code: &'static str,
        message: &'static str,
        hint: Option<String>,
    ) -> Self {
        Self {
            status,
            code,
            message,
            hint,
        }
    }

    pub fn bad_request(message: &'static str, hint: Option<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::BAD_REQUEST, message, hint)
    }

    /// One generic response for every authentication failure; callers cannot
    /// distinguish an unknown user from a wrong token.
    pub fn unauthorized() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            codes::UNAUTHORIZED,
            "Invalid credentials",
            None,
        )
    }

    pub fn store_unavailable() -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            codes::STORE_UNAVAILABLE,
            "Store temporarily unavailable",
            None,
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            warn!(
                target = "confido::http",
                code = self.code,
                hint = self.hint.as_deref().unwrap_or(""),
                "request failed"
            );
        }
        let body = ApiErrorBody {
            error: ApiErrorMessage {
                code: self.code.to_string(),
                message: self.message.to_string(),
                hint: self.hint,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

pub fn token_error_to_api(err: TokenError) -> ApiError {
    match err {
        TokenError::InvalidUsername(detail) => ApiError::new(
            StatusCode::BAD_REQUEST,
            codes::INVALID_USERNAME,
            "Invalid username",
            Some(detail),
        ),
        TokenError::DuplicateUser => ApiError::new(
            StatusCode::CONFLICT,
            codes::DUPLICATE_USER,
            "Username already registered",
            None,
        ),
        TokenError::Repo(_) => ApiError::store_unavailable(),
    }
}

pub fn cache_error_to_api(err: CacheError) -> ApiError {
    match err {
        CacheError::ConfigNotFound => ApiError::new(
            StatusCode::NOT_FOUND,
            codes::CONFIG_NOT_FOUND,
            "Config does not exist",
            None,
        ),
        CacheError::ConfigAlreadyExists => ApiError::new(
            StatusCode::CONFLICT,
            codes::CONFIG_ALREADY_EXISTS,
            "Config already exists",
            None,
        ),
        CacheError::DeleteFailed(detail) => ApiError::new(
            StatusCode::BAD_GATEWAY,
            codes::DELETE_FAILED,
            "Failed to delete config",
            Some(detail),
        ),
        CacheError::Repo(_) => ApiError::store_unavailable(),
    }
}
