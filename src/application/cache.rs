//! Write-through TTL cache in front of the versioned config store.
//!
//! Entries move through `absent → cached(valid) → cached(expired) → absent`.
//! A live entry is authoritative for reads and writes; the store is the truth
//! on a miss. Reads slide the expiration forward; a background sweeper evicts
//! expired entries on a fixed interval. Eviction only drops memory state, it
//! never deletes from the store.
//!
//! Locking: the map itself is guarded by one `RwLock` (structural insert and
//! delete take the write side, shared with the sweeper's removal pass), while
//! each entry carries its own body mutex and an atomic expiration so that
//! operations on different namespaces never serialize against each other.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use metrics::{counter, histogram};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::application::repos::RepoError;
use crate::application::revisions::{RevisionError, RevisionStore};
use crate::domain::revisions::Namespace;

pub(crate) const METRIC_CACHE_HIT: &str = "confido_cache_hit_total";
pub(crate) const METRIC_CACHE_MISS: &str = "confido_cache_miss_total";
pub(crate) const METRIC_CACHE_EVICTION: &str = "confido_cache_eviction_total";
pub(crate) const METRIC_CACHE_SWEEP_MS: &str = "confido_cache_sweep_ms";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("config does not exist")]
    ConfigNotFound,
    #[error("config already exists")]
    ConfigAlreadyExists,
    #[error("failed to delete config: {0}")]
    DeleteFailed(String),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl From<RevisionError> for CacheError {
    fn from(err: RevisionError) -> Self {
        match err {
            RevisionError::NotFound => Self::ConfigNotFound,
            RevisionError::Repo(repo) => Self::Repo(repo),
        }
    }
}

/// One cached configuration body.
///
/// The expiration is an atomic so reads and the sweeper's scan never contend
/// on the body mutex.
struct CacheEntry {
    /// Nanoseconds since the cache's origin instant.
    expires_at: AtomicI64,
    body: Mutex<serde_json::Value>,
}

impl CacheEntry {
    fn new(body: serde_json::Value, expires_at: i64) -> Self {
        Self {
            expires_at: AtomicI64::new(expires_at),
            body: Mutex::new(body),
        }
    }
}

pub struct ConfigCache {
    entries: RwLock<HashMap<Namespace, Arc<CacheEntry>>>,
    store: RevisionStore,
    ttl: Duration,
    origin: Instant,
}

impl ConfigCache {
    pub fn new(store: RevisionStore, ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            store,
            ttl,
            origin: Instant::now(),
        }
    }

    /// Returns the configuration body for the namespace.
    ///
    /// A live entry is served from memory and its expiration slides forward
    /// from now. An expired-but-unswept entry is never served as-is: the body
    /// is reloaded from the store into the same entry. An absent entry is
    /// loaded and populated under the structural lock.
    pub async fn get(&self, namespace: &Namespace) -> Result<serde_json::Value, CacheError> {
        let entry = self.entries.read().await.get(namespace).cloned();

        if let Some(entry) = entry {
            if !self.is_expired(&entry) {
                let body = entry.body.lock().await.clone();
                entry.expires_at.store(self.deadline(), Ordering::Release);
                counter!(METRIC_CACHE_HIT).increment(1);
                return Ok(body);
            }

            // Past TTL but not yet swept: the store is the truth now.
            counter!(METRIC_CACHE_MISS).increment(1);
            return match self.store.find_latest(namespace).await {
                Ok(latest) => {
                    let mut body = entry.body.lock().await;
                    body.clone_from(&latest.body);
                    entry.expires_at.store(self.deadline(), Ordering::Release);
                    Ok(latest.body)
                }
                Err(RevisionError::NotFound) => {
                    // The chain was deleted out from under the stale entry.
                    self.entries.write().await.remove(namespace);
                    Err(CacheError::ConfigNotFound)
                }
                Err(err) => Err(err.into()),
            };
        }

        counter!(METRIC_CACHE_MISS).increment(1);
        let latest = self.store.find_latest(namespace).await?;
        self.populate(namespace, latest.body.clone()).await;
        Ok(latest.body)
    }

    /// Creates the first revision for the namespace and caches it.
    ///
    /// The existence check and the insert happen under the structural write
    /// lock, so two racing creates for the same namespace cannot both
    /// succeed. If the store already holds a chain the cache is populated
    /// from it as a side effect before failing.
    pub async fn create(
        &self,
        namespace: &Namespace,
        body: serde_json::Value,
    ) -> Result<(), CacheError> {
        let mut entries = self.entries.write().await;

        if let Some(entry) = entries.get(namespace)
            && !self.is_expired(entry)
        {
            return Err(CacheError::ConfigAlreadyExists);
        }

        match self.store.find_latest(namespace).await {
            Ok(latest) => {
                entries.insert(
                    namespace.clone(),
                    Arc::new(CacheEntry::new(latest.body, self.deadline())),
                );
                Err(CacheError::ConfigAlreadyExists)
            }
            Err(RevisionError::NotFound) => {
                self.store.insert(namespace, body.clone()).await?;
                entries.insert(
                    namespace.clone(),
                    Arc::new(CacheEntry::new(body, self.deadline())),
                );
                debug!(namespace = %namespace, "cached new config");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Writes a new revision through to the store and refreshes the cache.
    ///
    /// With an entry present only that entry's lock is held; an absent entry
    /// is populated after the store accepts the update.
    pub async fn update(
        &self,
        namespace: &Namespace,
        body: serde_json::Value,
    ) -> Result<(), CacheError> {
        let entry = self.entries.read().await.get(namespace).cloned();

        if let Some(entry) = entry {
            let mut cached = entry.body.lock().await;
            match self.store.update(namespace, body.clone()).await {
                Ok(_) => {
                    *cached = body;
                    entry.expires_at.store(self.deadline(), Ordering::Release);
                    Ok(())
                }
                Err(RevisionError::NotFound) => {
                    // The chain vanished; the entry is stale, drop it.
                    drop(cached);
                    self.entries.write().await.remove(namespace);
                    Err(CacheError::ConfigNotFound)
                }
                Err(err) => Err(err.into()),
            }
        } else {
            self.store.update(namespace, body.clone()).await?;
            self.populate(namespace, body).await;
            Ok(())
        }
    }

    /// Removes the cache entry (if any) and drops the whole revision chain.
    ///
    /// Idempotent with respect to the cache; a store failure surfaces as
    /// [`CacheError::DeleteFailed`].
    pub async fn delete(&self, namespace: &Namespace) -> Result<(), CacheError> {
        let mut entries = self.entries.write().await;
        entries.remove(namespace);
        self.store
            .delete_all(namespace)
            .await
            .map_err(|err| CacheError::DeleteFailed(err.to_string()))?;
        debug!(namespace = %namespace, "deleted config");
        Ok(())
    }

    /// Spawns the background expiration sweeper.
    ///
    /// The task wakes every `interval`, evicts expired entries, and exits
    /// when the returned handle is stopped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let cache = Arc::clone(self);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // the first tick fires immediately
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = cache.sweep_once().await;
                        if evicted > 0 {
                            info!(evicted, "swept expired cache entries");
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            debug!("cache sweeper shutting down");
                            break;
                        }
                    }
                }
            }
        });

        SweeperHandle {
            shutdown: shutdown_tx,
            task,
        }
    }

    /// One sweep pass: collect expired keys under a read-only scan, then
    /// remove them under the write lock. A key refreshed between the scan and
    /// the removal may still be evicted; the next read rebuilds it from the
    /// store, so the race costs one redundant eviction, never a stale body.
    pub async fn sweep_once(&self) -> usize {
        let started = std::time::Instant::now();

        let expired: Vec<Namespace> = {
            let entries = self.entries.read().await;
            entries
                .iter()
                .filter(|(_, entry)| self.is_expired(entry))
                .map(|(namespace, _)| namespace.clone())
                .collect()
        };

        let mut evicted = 0;
        if !expired.is_empty() {
            let mut entries = self.entries.write().await;
            for namespace in &expired {
                if entries.remove(namespace).is_some() {
                    evicted += 1;
                }
            }
        }

        if evicted > 0 {
            counter!(METRIC_CACHE_EVICTION).increment(evicted as u64);
        }
        histogram!(METRIC_CACHE_SWEEP_MS).record(started.elapsed().as_secs_f64() * 1000.0);
        evicted
    }

    /// Number of entries currently held, including expired ones not yet
    /// swept.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    async fn populate(&self, namespace: &Namespace, body: serde_json::Value) {
        let mut entries = self.entries.write().await;
        match entries.get(namespace) {
            Some(existing) => {
                // Someone populated concurrently; refresh rather than replace
                // so tasks holding the entry Arc observe the newer body.
                let mut cached = existing.body.lock().await;
                *cached = body;
                existing.expires_at.store(self.deadline(), Ordering::Release);
            }
            None => {
                entries.insert(
                    namespace.clone(),
                    Arc::new(CacheEntry::new(body, self.deadline())),
                );
            }
        }
    }

    fn now(&self) -> i64 {
        self.origin.elapsed().as_nanos() as i64
    }

    fn deadline(&self) -> i64 {
        self.now() + self.ttl.as_nanos() as i64
    }

    fn is_expired(&self, entry: &CacheEntry) -> bool {
        self.now() > entry.expires_at.load(Ordering::Acquire)
    }
}

/// Handle owning the sweeper task and its shutdown signal.
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signals the sweeper to exit and waits for it.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.task.await
            && !err.is_cancelled()
        {
            warn!(error = %err, "cache sweeper task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;
    use tokio::time::advance;

    use super::*;
    use crate::application::testing::InMemoryRevisions;

    const TTL: Duration = Duration::from_secs(600);

    fn cache_over(repo: Arc<InMemoryRevisions>) -> Arc<ConfigCache> {
        Arc::new(ConfigCache::new(RevisionStore::new(repo), TTL))
    }

    fn ns(user: &str, app: &str) -> Namespace {
        Namespace::new(user, app)
    }

    #[tokio::test]
    async fn create_then_get_roundtrips() {
        let repo = Arc::new(InMemoryRevisions::default());
        let cache = cache_over(repo);
        let namespace = ns("alice", "app1");

        cache
            .create(&namespace, json!({"key": "value", "n": 3}))
            .await
            .expect("create");
        let body = cache.get(&namespace).await.expect("get");
        assert_eq!(body, json!({"key": "value", "n": 3}));
    }

    #[tokio::test]
    async fn create_fails_when_cached_or_stored() {
        let repo = Arc::new(InMemoryRevisions::default());
        let cache = cache_over(repo.clone());
        let namespace = ns("alice", "app1");

        cache.create(&namespace, json!({"v": 1})).await.expect("create");
        let err = cache
            .create(&namespace, json!({"v": 2}))
            .await
            .expect_err("cached entry");
        assert!(matches!(err, CacheError::ConfigAlreadyExists));

        // Same result when the chain exists only in the store.
        let other = cache_over(repo);
        let err = other
            .create(&namespace, json!({"v": 3}))
            .await
            .expect_err("stored chain");
        assert!(matches!(err, CacheError::ConfigAlreadyExists));
        // The probe caches the stored body as a side effect.
        assert_eq!(other.get(&namespace).await.expect("get"), json!({"v": 1}));
    }

    #[tokio::test]
    async fn create_preserves_other_cached_tenants() {
        let repo = Arc::new(InMemoryRevisions::default());
        let cache = cache_over(repo);

        cache
            .create(&ns("alice", "app1"), json!({"who": "alice"}))
            .await
            .expect("alice");
        cache
            .create(&ns("bob", "app2"), json!({"who": "bob"}))
            .await
            .expect("bob");

        assert_eq!(cache.len().await, 2);
        assert_eq!(
            cache.get(&ns("alice", "app1")).await.expect("alice get"),
            json!({"who": "alice"})
        );
    }

    #[tokio::test]
    async fn get_without_config_fails() {
        let repo = Arc::new(InMemoryRevisions::default());
        let cache = cache_over(repo);

        let err = cache.get(&ns("alice", "gone")).await.expect_err("missing");
        assert!(matches!(err, CacheError::ConfigNotFound));
    }

    #[tokio::test]
    async fn update_writes_through_and_chains_revisions() {
        let repo = Arc::new(InMemoryRevisions::default());
        let cache = cache_over(repo.clone());
        let namespace = ns("alice", "app1");

        cache.create(&namespace, json!({"v": 1})).await.expect("create");
        cache.update(&namespace, json!({"v": 2})).await.expect("update");

        assert_eq!(cache.get(&namespace).await.expect("get"), json!({"v": 2}));
        assert_eq!(repo.chain_len(&namespace), 2);

        let chain = repo.chain(&namespace);
        assert_eq!(chain[1].previous, Some(chain[0].id));
    }

    #[tokio::test]
    async fn update_without_entry_populates_cache_from_store_path() {
        let repo = Arc::new(InMemoryRevisions::default());
        let seed = cache_over(repo.clone());
        let namespace = ns("alice", "app1");
        seed.create(&namespace, json!({"v": 1})).await.expect("seed");

        // Fresh cache, no entry for the namespace.
        let cache = cache_over(repo.clone());
        cache.update(&namespace, json!({"v": 2})).await.expect("update");
        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.get(&namespace).await.expect("get"), json!({"v": 2}));
    }

    #[tokio::test]
    async fn update_without_prior_revision_fails() {
        let repo = Arc::new(InMemoryRevisions::default());
        let cache = cache_over(repo);

        let err = cache
            .update(&ns("alice", "app1"), json!({"v": 1}))
            .await
            .expect_err("no chain");
        assert!(matches!(err, CacheError::ConfigNotFound));
    }

    #[tokio::test]
    async fn delete_then_get_fails() {
        let repo = Arc::new(InMemoryRevisions::default());
        let cache = cache_over(repo.clone());
        let namespace = ns("alice", "app1");

        cache.create(&namespace, json!({"v": 1})).await.expect("create");
        cache.delete(&namespace).await.expect("delete");

        assert_eq!(repo.chain_len(&namespace), 0);
        let err = cache.get(&namespace).await.expect_err("deleted");
        assert!(matches!(err, CacheError::ConfigNotFound));
    }

    #[tokio::test]
    async fn delete_is_idempotent_for_the_cache() {
        let repo = Arc::new(InMemoryRevisions::default());
        let cache = cache_over(repo);

        // No entry and no chain: still succeeds.
        cache.delete(&ns("alice", "app1")).await.expect("delete");
    }

    #[tokio::test]
    async fn delete_surfaces_store_failure() {
        let repo = Arc::new(InMemoryRevisions::default());
        let cache = cache_over(repo.clone());
        let namespace = ns("alice", "app1");

        cache.create(&namespace, json!({"v": 1})).await.expect("create");
        repo.fail_next_drop();

        let err = cache.delete(&namespace).await.expect_err("store down");
        assert!(matches!(err, CacheError::DeleteFailed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn read_slides_expiration_forward() {
        let repo = Arc::new(InMemoryRevisions::default());
        let cache = cache_over(repo);
        let namespace = ns("alice", "app1");

        cache.create(&namespace, json!({"v": 1})).await.expect("create");

        advance(Duration::from_secs(540)).await; // t = 9min
        cache.get(&namespace).await.expect("get extends ttl");

        advance(Duration::from_secs(540)).await; // t = 18min < 9min + TTL
        assert_eq!(cache.sweep_once().await, 0);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_unswept_entry_is_reloaded_not_served_stale() {
        let repo = Arc::new(InMemoryRevisions::default());
        let cache = cache_over(repo.clone());
        let namespace = ns("alice", "app1");

        cache.create(&namespace, json!({"v": 1})).await.expect("create");

        // Mutate the store behind the cache's back, then let the entry expire.
        repo.append_raw(&namespace, json!({"v": 2}));
        advance(TTL + Duration::from_secs(1)).await;

        let body = cache.get(&namespace).await.expect("reload");
        assert_eq!(body, json!({"v": 2}));
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_evicts_only_expired_entries_and_never_the_store() {
        let repo = Arc::new(InMemoryRevisions::default());
        let cache = cache_over(repo.clone());

        cache
            .create(&ns("alice", "app1"), json!({"v": 1}))
            .await
            .expect("alice");
        advance(Duration::from_secs(300)).await;
        cache
            .create(&ns("bob", "app2"), json!({"v": 2}))
            .await
            .expect("bob");

        advance(Duration::from_secs(330)).await; // alice expired, bob not
        assert_eq!(cache.sweep_once().await, 1);
        assert_eq!(cache.len().await, 1);
        assert_eq!(repo.chain_len(&ns("alice", "app1")), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_task_evicts_and_stops_on_signal() {
        let repo = Arc::new(InMemoryRevisions::default());
        let cache = cache_over(repo);
        let namespace = ns("alice", "app1");

        cache.create(&namespace, json!({"v": 1})).await.expect("create");
        let sweeper = cache.spawn_sweeper(Duration::from_secs(300));

        advance(TTL + Duration::from_secs(301)).await;
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        assert!(cache.is_empty().await);

        sweeper.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn gets_on_distinct_namespaces_do_not_block_each_other() {
        let repo = Arc::new(InMemoryRevisions::default());
        let cache = cache_over(repo);

        cache
            .create(&ns("alice", "app1"), json!({"v": 1}))
            .await
            .expect("alice");
        cache
            .create(&ns("bob", "app2"), json!({"v": 2}))
            .await
            .expect("bob");

        // Pin alice's entry lock; bob's read must still complete.
        let alice_entry = cache
            .entries
            .read()
            .await
            .get(&ns("alice", "app1"))
            .cloned()
            .expect("alice entry");
        let _held = alice_entry.body.lock().await;

        let body = tokio::time::timeout(
            Duration::from_millis(100),
            cache.get(&ns("bob", "app2")),
        )
        .await
        .expect("must not block on alice's entry lock")
        .expect("get");
        assert_eq!(body, json!({"v": 2}));
    }

    /// TTL = 10min, sweep = 5min: create at t=0, read at t=9min extends the
    /// expiration to t=19min, an idle sweep at t=20min evicts, and a read at
    /// t=21min still serves the body from the store.
    #[tokio::test(start_paused = true)]
    async fn ttl_scenario_end_to_end() {
        let repo = Arc::new(InMemoryRevisions::default());
        let cache = cache_over(repo);
        let namespace = ns("alice", "app1");

        cache.create(&namespace, json!({"x": 1})).await.expect("create");

        advance(Duration::from_secs(9 * 60)).await;
        assert_eq!(cache.get(&namespace).await.expect("t=9min"), json!({"x": 1}));

        advance(Duration::from_secs(11 * 60)).await; // t = 20min > 19min
        assert_eq!(cache.sweep_once().await, 1);
        assert!(cache.is_empty().await);

        advance(Duration::from_secs(60)).await;
        assert_eq!(
            cache.get(&namespace).await.expect("t=21min"),
            json!({"x": 1})
        );
        assert_eq!(cache.len().await, 1);
    }
}
