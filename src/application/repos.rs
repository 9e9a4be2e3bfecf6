//! Repository traits describing persistence adapters.
//!
//! Services only ever see these traits; the concrete store (Postgres in
//! production, in-memory maps in tests) is wired in at startup. The store is
//! required to preserve physical insertion order for revisions — "most
//! recent" never relies on wall-clock timestamps.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::revisions::{ConfigRevisionRecord, Namespace};
use crate::domain::users::UserRecord;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct CreateUserParams {
    pub username: String,
    pub token_digest: Vec<u8>,
}

#[async_trait]
pub trait UsersRepo: Send + Sync {
    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, RepoError>;
}

#[derive(Debug, Clone)]
pub struct InsertRevisionParams {
    pub namespace: Namespace,
    pub body: serde_json::Value,
    pub previous: Option<Uuid>,
}

#[async_trait]
pub trait RevisionsRepo: Send + Sync {
    /// Appends a revision; the store assigns it a position after every
    /// revision inserted before it.
    async fn insert_revision(
        &self,
        params: InsertRevisionParams,
    ) -> Result<ConfigRevisionRecord, RepoError>;

    /// Returns the most recently inserted revision for the namespace, by
    /// insertion order.
    async fn find_latest(
        &self,
        namespace: &Namespace,
    ) -> Result<Option<ConfigRevisionRecord>, RepoError>;

    /// Hard-deletes the entire chain for the namespace. Returns the number of
    /// revisions removed.
    async fn drop_namespace(&self, namespace: &Namespace) -> Result<u64, RepoError>;
}
