//! In-process doubles for the relational store, the cache and the delta channel
#![allow(dead_code)]

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use collection_cache::{
    CacheKey, CacheResult, ChildKey, CollectionCache, MemoryCollectionCache, ParentKey, TtlWindow,
};
use counter_propagation::{DeltaEvent, DeltaPublisher, PropagationError, PropagationResult};
use interaction_service::cache_aside::{
    CacheAsideRepository, ChildRecord, ChildStore, StoreError, StoreResult, TaskPool,
};
use interaction_service::domain::models::{
    Comment, Favorite, Follow, NewComment, NewFavorite, NewFollow,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// Records buildable from a draft by the memory store.
pub trait FromDraft: ChildRecord {
    type Draft: Send + Sync + 'static;

    fn from_draft(draft: Self::Draft, id: i64, created_at: DateTime<Utc>) -> Self;
}

impl FromDraft for Comment {
    type Draft = NewComment;

    fn from_draft(draft: NewComment, id: i64, created_at: DateTime<Utc>) -> Self {
        Comment {
            id,
            video_id: draft.video_id,
            user_id: draft.user_id,
            content: draft.content,
            created_at,
        }
    }
}

impl FromDraft for Favorite {
    type Draft = NewFavorite;

    fn from_draft(draft: NewFavorite, _id: i64, created_at: DateTime<Utc>) -> Self {
        Favorite {
            user_id: draft.user_id,
            video_id: draft.video_id,
            author_id: draft.author_id,
            created_at,
        }
    }
}

impl FromDraft for Follow {
    type Draft = NewFollow;

    fn from_draft(draft: NewFollow, _id: i64, created_at: DateTime<Utc>) -> Self {
        Follow {
            follower_id: draft.follower_id,
            followee_id: draft.followee_id,
            created_at,
        }
    }
}

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// Relational store held in memory; every insert gets a later timestamp.
pub struct MemoryStore<R: FromDraft> {
    rows: Mutex<BTreeMap<(ParentKey, ChildKey), R>>,
    next_id: AtomicI64,
    failing: AtomicBool,
    list_calls: AtomicUsize,
    member_calls: AtomicUsize,
    list_delay: Mutex<Option<Duration>>,
    inserted: Arc<Notify>,
}

impl<R: FromDraft> Default for MemoryStore<R> {
    fn default() -> Self {
        Self {
            rows: Mutex::new(BTreeMap::new()),
            next_id: AtomicI64::new(1),
            failing: AtomicBool::new(false),
            list_calls: AtomicUsize::new(0),
            member_calls: AtomicUsize::new(0),
            list_delay: Mutex::new(None),
            inserted: Arc::new(Notify::new()),
        }
    }
}

impl<R: FromDraft> MemoryStore<R> {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_list_delay(&self, delay: Duration) {
        *self.list_delay.lock().unwrap() = Some(delay);
    }

    /// Signalled once per committed insert.
    pub fn inserted(&self) -> Arc<Notify> {
        self.inserted.clone()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn member_calls(&self) -> usize {
        self.member_calls.load(Ordering::SeqCst)
    }

    pub fn children_of(&self, parent: ParentKey) -> Vec<ChildKey> {
        self.rows
            .lock()
            .unwrap()
            .keys()
            .filter(|(p, _)| *p == parent)
            .map(|(_, c)| *c)
            .collect()
    }

    fn check(&self) -> StoreResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("database offline".into()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl<R: FromDraft> ChildStore for MemoryStore<R> {
    type Record = R;
    type Draft = R::Draft;

    async fn list_children(&self, parent: ParentKey) -> StoreResult<Vec<R>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.list_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check()?;

        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|((p, _), _)| *p == parent)
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn find_child(&self, parent: ParentKey, child: ChildKey) -> StoreResult<Option<R>> {
        self.check()?;
        Ok(self.rows.lock().unwrap().get(&(parent, child)).cloned())
    }

    async fn find_members(
        &self,
        parent: ParentKey,
        children: &[ChildKey],
    ) -> StoreResult<HashSet<ChildKey>> {
        self.member_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let rows = self.rows.lock().unwrap();
        Ok(children
            .iter()
            .copied()
            .filter(|c| rows.contains_key(&(parent, *c)))
            .collect())
    }

    async fn insert_child(&self, draft: R::Draft) -> StoreResult<Option<R>> {
        self.check()?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let record = R::from_draft(draft, id, base_time() + ChronoDuration::seconds(id));
        let key = (record.parent_key(), record.child_key());

        let mut rows = self.rows.lock().unwrap();
        if rows.contains_key(&key) {
            return Ok(None);
        }
        rows.insert(key, record.clone());
        drop(rows);
        self.inserted.notify_one();
        Ok(Some(record))
    }

    async fn delete_child(&self, parent: ParentKey, child: ChildKey) -> StoreResult<Option<R>> {
        self.check()?;
        Ok(self.rows.lock().unwrap().remove(&(parent, child)))
    }
}

/// Captures emitted deltas instead of sending them.
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<DeltaEvent>>,
    failing: AtomicBool,
}

impl RecordingPublisher {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<DeltaEvent> {
        self.events.lock().unwrap().clone()
    }

    /// (counter, entity, delta) triples, for order-independent comparison
    pub fn triples(&self) -> Vec<(String, i64, i64)> {
        let mut triples: Vec<_> = self
            .events()
            .into_iter()
            .map(|e| (e.counter.to_string(), e.entity_id, e.delta))
            .collect();
        triples.sort();
        triples
    }
}

#[async_trait::async_trait]
impl DeltaPublisher for RecordingPublisher {
    async fn emit(&self, event: &DeltaEvent) -> PropagationResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PropagationError::PublishFailed("broker down".into()));
        }
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Memory cache wrapper that counts child lookups and can drop a
/// collection right after its existence check.
pub struct InstrumentedCache {
    inner: MemoryCollectionCache,
    has_child_calls: AtomicUsize,
    expire_after_exists: Mutex<HashSet<ParentKey>>,
}

impl InstrumentedCache {
    pub fn new(inner: MemoryCollectionCache) -> Self {
        Self {
            inner,
            has_child_calls: AtomicUsize::new(0),
            expire_after_exists: Mutex::new(HashSet::new()),
        }
    }

    pub fn has_child_calls(&self) -> usize {
        self.has_child_calls.load(Ordering::SeqCst)
    }

    /// Expire `parent` once, right after the next `exists` on it.
    pub fn expire_after_exists(&self, parent: ParentKey) {
        self.expire_after_exists.lock().unwrap().insert(parent);
    }
}

#[async_trait::async_trait]
impl CollectionCache for InstrumentedCache {
    async fn exists(&self, parent: ParentKey) -> CacheResult<bool> {
        let found = self.inner.exists(parent).await?;
        if self.expire_after_exists.lock().unwrap().remove(&parent) {
            self.inner.expire(parent);
        }
        Ok(found)
    }

    async fn has_child(&self, key: CacheKey) -> CacheResult<bool> {
        self.has_child_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.has_child(key).await
    }

    async fn list(&self, parent: ParentKey) -> CacheResult<Option<Vec<String>>> {
        self.inner.list(parent).await
    }

    async fn put_child(&self, key: CacheKey, value: String) -> CacheResult<bool> {
        self.inner.put_child(key, value).await
    }

    async fn remove_child(&self, key: CacheKey) -> CacheResult<()> {
        self.inner.remove_child(key).await
    }

    async fn materialize(
        &self,
        parent: ParentKey,
        children: Vec<(ChildKey, String)>,
    ) -> CacheResult<Duration> {
        self.inner.materialize(parent, children).await
    }
}

pub struct Harness<R: FromDraft> {
    pub repo: CacheAsideRepository<MemoryStore<R>>,
    pub store: Arc<MemoryStore<R>>,
    pub cache: MemoryCollectionCache,
    pub lookups: Arc<InstrumentedCache>,
    pub publisher: Arc<RecordingPublisher>,
    pub tasks: TaskPool,
}

impl<R: FromDraft> Harness<R> {
    pub fn new(domain: &'static str) -> Self {
        let store = Arc::new(MemoryStore::<R>::default());
        let cache = MemoryCollectionCache::new(TtlWindow::default());
        let publisher = Arc::new(RecordingPublisher::default());
        let lookups = Arc::new(InstrumentedCache::new(cache.clone()));
        let tasks = TaskPool::new(4, 256);

        let repo = CacheAsideRepository::new(
            domain,
            store.clone(),
            lookups.clone() as Arc<dyn CollectionCache>,
            publisher.clone() as Arc<dyn DeltaPublisher>,
            tasks.clone(),
        );

        Self {
            repo,
            store,
            cache,
            lookups,
            publisher,
            tasks,
        }
    }

    /// Let every background cache write and delta finish.
    pub async fn settle(&self) {
        self.tasks.wait_idle().await;
    }
}

pub fn new_comment(video_id: i64, user_id: i64, content: &str) -> NewComment {
    NewComment {
        video_id,
        user_id,
        content: content.to_string(),
    }
}
