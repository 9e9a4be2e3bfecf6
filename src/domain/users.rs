//! Registered users and the username invariant.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::error::DomainError;

pub const USERNAME_MIN_CHARS: usize = 1;
pub const USERNAME_MAX_CHARS: usize = 16;

/// A validated username, 1 to 16 characters.
///
/// Construction goes through [`Username::parse`] so every instance in the
/// system already satisfies the length invariant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Username(String);

impl Username {
    pub fn parse(raw: impl Into<String>) -> Result<Self, DomainError> {
        let raw = raw.into();
        let chars = raw.chars().count();
        if !(USERNAME_MIN_CHARS..=USERNAME_MAX_CHARS).contains(&chars) {
            return Err(DomainError::validation(format!(
                "username must be between {USERNAME_MIN_CHARS} and {USERNAME_MAX_CHARS} characters, got {chars}"
            )));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Display for Username {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A registered user. Immutable after creation; the plaintext token is never
/// part of this record, only the keyed digest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: Uuid,
    pub username: String,
    pub token_digest: Vec<u8>,
    pub created_at: OffsetDateTime,
}
