//! Configuration revisions and the namespace they are keyed by.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// The (user, application) pair identifying one configuration document.
///
/// Cache entries and revision chains are both keyed by this.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Namespace {
    pub username: String,
    pub application: String,
}

impl Namespace {
    pub fn new(username: impl Into<String>, application: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            application: application.into(),
        }
    }
}

impl Display for Namespace {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.username, self.application)
    }
}

/// One link in a namespace's revision chain.
///
/// Revisions are append-only: every create or update inserts a new record and
/// `previous` back-references the head it superseded (`None` for the first
/// revision). Records are never mutated and the chain is never compacted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigRevisionRecord {
    pub id: Uuid,
    pub namespace: Namespace,
    pub body: serde_json::Value,
    pub previous: Option<Uuid>,
    pub created_at: OffsetDateTime,
}
