//! In-memory repository implementations for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{
    CreateUserParams, InsertRevisionParams, RepoError, RevisionsRepo, UsersRepo,
};
use crate::domain::revisions::{ConfigRevisionRecord, Namespace};
use crate::domain::users::UserRecord;

#[derive(Default)]
pub(crate) struct InMemoryUsers {
    users: Mutex<HashMap<String, UserRecord>>,
    lookups: AtomicUsize,
}

impl InMemoryUsers {
    pub(crate) fn stored_digest(&self, username: &str) -> Option<Vec<u8>> {
        self.users
            .lock()
            .unwrap()
            .get(username)
            .map(|user| user.token_digest.clone())
    }

    pub(crate) fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl UsersRepo for InMemoryUsers {
    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError> {
        let mut users = self.users.lock().unwrap();
        if users.contains_key(&params.username) {
            return Err(RepoError::Duplicate {
                constraint: "users_username_key".to_owned(),
            });
        }
        let record = UserRecord {
            id: Uuid::new_v4(),
            username: params.username.clone(),
            token_digest: params.token_digest,
            created_at: OffsetDateTime::now_utc(),
        };
        users.insert(params.username, record.clone());
        Ok(record)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, RepoError> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        Ok(self.users.lock().unwrap().get(username).cloned())
    }
}

/// A single vector keeps global insertion order, mirroring the monotonic
/// ordering guarantee the real store provides.
#[derive(Default)]
pub(crate) struct InMemoryRevisions {
    revisions: Mutex<Vec<ConfigRevisionRecord>>,
    fail_drop: AtomicBool,
}

impl InMemoryRevisions {
    pub(crate) fn chain(&self, namespace: &Namespace) -> Vec<ConfigRevisionRecord> {
        self.revisions
            .lock()
            .unwrap()
            .iter()
            .filter(|revision| &revision.namespace == namespace)
            .cloned()
            .collect()
    }

    pub(crate) fn chain_len(&self, namespace: &Namespace) -> usize {
        self.chain(namespace).len()
    }

    /// Appends a revision directly, bypassing the cache under test.
    pub(crate) fn append_raw(&self, namespace: &Namespace, body: serde_json::Value) {
        let previous = self.chain(namespace).last().map(|revision| revision.id);
        self.revisions.lock().unwrap().push(ConfigRevisionRecord {
            id: Uuid::new_v4(),
            namespace: namespace.clone(),
            body,
            previous,
            created_at: OffsetDateTime::now_utc(),
        });
    }

    /// Makes the next `drop_namespace` call fail, simulating a store outage.
    pub(crate) fn fail_next_drop(&self) {
        self.fail_drop.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl RevisionsRepo for InMemoryRevisions {
    async fn insert_revision(
        &self,
        params: InsertRevisionParams,
    ) -> Result<ConfigRevisionRecord, RepoError> {
        let record = ConfigRevisionRecord {
            id: Uuid::new_v4(),
            namespace: params.namespace,
            body: params.body,
            previous: params.previous,
            created_at: OffsetDateTime::now_utc(),
        };
        self.revisions.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn find_latest(
        &self,
        namespace: &Namespace,
    ) -> Result<Option<ConfigRevisionRecord>, RepoError> {
        Ok(self
            .revisions
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|revision| &revision.namespace == namespace)
            .cloned())
    }

    async fn drop_namespace(&self, namespace: &Namespace) -> Result<u64, RepoError> {
        if self.fail_drop.swap(false, Ordering::SeqCst) {
            return Err(RepoError::Persistence("store unavailable".to_owned()));
        }
        let mut revisions = self.revisions.lock().unwrap();
        let before = revisions.len();
        revisions.retain(|revision| &revision.namespace != namespace);
        Ok((before - revisions.len()) as u64)
    }
}
