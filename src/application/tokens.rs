//! Token authority: issues and validates opaque bearer tokens.
//!
//! A token is a random nonce handed to the caller exactly once at
//! registration. The server persists only `SHA-256(secret ‖ nonce)`, so a
//! store compromise does not directly yield usable credentials. Validation
//! recomputes the digest and compares in constant time.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use uuid::Uuid;

use crate::application::repos::{CreateUserParams, RepoError, UsersRepo};
use crate::domain::users::Username;

/// Separator between the username and the nonce in the credential wire
/// format `<username>.<token>`.
const CREDENTIAL_SEPARATOR: char = '.';

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid username: {0}")]
    InvalidUsername(String),
    #[error("username already registered")]
    DuplicateUser,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("malformed credential")]
    MalformedCredential,
    #[error("unknown user")]
    UnknownUser,
    #[error("invalid token")]
    InvalidToken,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// A freshly issued token. The `token` field is the only copy of the
/// plaintext nonce that will ever exist.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub username: Username,
    pub token: String,
}

impl IssuedToken {
    /// The full credential the caller presents on subsequent requests.
    pub fn credential(&self) -> String {
        format!("{}{CREDENTIAL_SEPARATOR}{}", self.username, self.token)
    }
}

#[derive(Clone)]
pub struct TokenService {
    repo: Arc<dyn UsersRepo>,
    secret: Arc<str>,
}

impl TokenService {
    pub fn new(repo: Arc<dyn UsersRepo>, secret: impl Into<Arc<str>>) -> Self {
        Self {
            repo,
            secret: secret.into(),
        }
    }

    /// Registers `username` and returns its plaintext token.
    ///
    /// The pre-insert existence check is the primary uniqueness defense; a
    /// unique-constraint violation from the store maps to the same error so
    /// racing registrations cannot both succeed.
    pub async fn issue(&self, username: &str) -> Result<IssuedToken, TokenError> {
        let username =
            Username::parse(username).map_err(|err| TokenError::InvalidUsername(err.to_string()))?;

        if self
            .repo
            .find_by_username(username.as_str())
            .await?
            .is_some()
        {
            return Err(TokenError::DuplicateUser);
        }

        let token = Self::generate_token();
        let token_digest = self.keyed_digest(&token);

        self.repo
            .create_user(CreateUserParams {
                username: username.as_str().to_owned(),
                token_digest,
            })
            .await
            .map_err(|err| match err {
                RepoError::Duplicate { .. } => TokenError::DuplicateUser,
                other => TokenError::Repo(other),
            })?;

        Ok(IssuedToken { username, token })
    }

    /// Validates a `<username>.<token>` credential and yields the username.
    pub async fn validate(&self, credential: &str) -> Result<Username, AuthError> {
        let (username, token) = credential
            .split_once(CREDENTIAL_SEPARATOR)
            .ok_or(AuthError::MalformedCredential)?;
        if username.is_empty() || token.is_empty() {
            return Err(AuthError::MalformedCredential);
        }

        let record = self
            .repo
            .find_by_username(username)
            .await?
            .ok_or(AuthError::UnknownUser)?;

        let candidate = self.keyed_digest(token);
        if record.token_digest.ct_eq(&candidate).unwrap_u8() == 0 {
            return Err(AuthError::InvalidToken);
        }

        Username::parse(record.username).map_err(|_| AuthError::UnknownUser)
    }

    fn keyed_digest(&self, token: &str) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(self.secret.as_bytes());
        hasher.update(token.as_bytes());
        hasher.finalize().to_vec()
    }

    fn generate_token() -> String {
        format!(
            "{}{}",
            Uuid::new_v4().simple(),
            Uuid::new_v4().simple()
        )
    }
}
