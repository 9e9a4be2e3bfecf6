//! Versioned configuration store: one append-only revision chain per
//! namespace.
//!
//! Every write inserts a new revision; `update` links it to the head it
//! replaced. Growth is unbounded by design — the chain is never compacted.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::application::repos::{InsertRevisionParams, RepoError, RevisionsRepo};
use crate::domain::revisions::{ConfigRevisionRecord, Namespace};

#[derive(Debug, Error)]
pub enum RevisionError {
    #[error("no revision exists for the namespace")]
    NotFound,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Clone)]
pub struct RevisionStore {
    repo: Arc<dyn RevisionsRepo>,
}

impl RevisionStore {
    pub fn new(repo: Arc<dyn RevisionsRepo>) -> Self {
        Self { repo }
    }

    /// Appends the first revision of a chain (no back-reference).
    pub async fn insert(
        &self,
        namespace: &Namespace,
        body: serde_json::Value,
    ) -> Result<ConfigRevisionRecord, RevisionError> {
        let record = self
            .repo
            .insert_revision(InsertRevisionParams {
                namespace: namespace.clone(),
                body,
                previous: None,
            })
            .await?;
        debug!(namespace = %namespace, revision = %record.id, "inserted initial revision");
        Ok(record)
    }

    /// Returns the most recently inserted revision, by store insertion order.
    pub async fn find_latest(
        &self,
        namespace: &Namespace,
    ) -> Result<ConfigRevisionRecord, RevisionError> {
        self.repo
            .find_latest(namespace)
            .await?
            .ok_or(RevisionError::NotFound)
    }

    /// Appends a revision back-linked to the current head. Fails if the chain
    /// is empty — updates never create chains.
    pub async fn update(
        &self,
        namespace: &Namespace,
        body: serde_json::Value,
    ) -> Result<ConfigRevisionRecord, RevisionError> {
        let latest = self.find_latest(namespace).await?;
        let record = self
            .repo
            .insert_revision(InsertRevisionParams {
                namespace: namespace.clone(),
                body,
                previous: Some(latest.id),
            })
            .await?;
        debug!(
            namespace = %namespace,
            revision = %record.id,
            previous = %latest.id,
            "appended revision"
        );
        Ok(record)
    }

    /// Irrevocably discards the whole chain for the namespace.
    pub async fn delete_all(&self, namespace: &Namespace) -> Result<u64, RevisionError> {
        let removed = self.repo.drop_namespace(namespace).await?;
        debug!(namespace = %namespace, removed, "dropped revision chain");
        Ok(removed)
    }
}
