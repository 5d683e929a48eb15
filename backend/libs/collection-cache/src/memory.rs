//! In-process collection cache
//!
//! Mirrors the Redis hash layout (sentinel stored as a field, per-collection
//! expiry) for tests and single-node development runs.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::keys::{child_field, is_sentinel, SENTINEL_FIELD};
use crate::{CacheError, CacheKey, CacheResult, ChildKey, CollectionCache, ParentKey, TtlWindow};

struct Collection {
    fields: BTreeMap<String, String>,
    ttl: Duration,
    expires_at: Instant,
}

#[derive(Default)]
struct MemoryState {
    collections: HashMap<ParentKey, Collection>,
    unavailable: bool,
    materializations: usize,
}

impl MemoryState {
    fn live(&mut self, parent: ParentKey) -> Option<&mut Collection> {
        let expired = self
            .collections
            .get(&parent)
            .map(|c| c.expires_at <= Instant::now())
            .unwrap_or(false);
        if expired {
            self.collections.remove(&parent);
        }
        self.collections.get_mut(&parent)
    }
}

/// Collection cache held in process memory
#[derive(Clone, Default)]
pub struct MemoryCollectionCache {
    state: Arc<Mutex<MemoryState>>,
    ttl: TtlWindow,
}

impl MemoryCollectionCache {
    pub fn new(ttl: TtlWindow) -> Self {
        Self {
            state: Arc::default(),
            ttl,
        }
    }

    fn lock(&self) -> CacheResult<MutexGuard<'_, MemoryState>> {
        let guard = self
            .state
            .lock()
            .map_err(|_| CacheError::Unavailable("memory cache lock poisoned".to_string()))?;
        if guard.unavailable {
            return Err(CacheError::Unavailable("memory cache offline".to_string()));
        }
        Ok(guard)
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make every subsequent operation fail with `CacheError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state().unavailable = unavailable;
    }

    /// Drop a parent's collection, as a TTL expiry would.
    pub fn expire(&self, parent: ParentKey) {
        self.state().collections.remove(&parent);
    }

    /// Drop every collection.
    pub fn clear(&self) {
        self.state().collections.clear();
    }

    /// TTL applied at the last materialization of `parent`, if cached.
    pub fn ttl_of(&self, parent: ParentKey) -> Option<Duration> {
        self.state().live(parent).map(|c| c.ttl)
    }

    /// Number of successful `materialize` calls.
    pub fn materializations(&self) -> usize {
        self.state().materializations
    }

    /// Raw children of a cached collection keyed by child id, sentinel excluded.
    pub fn snapshot(&self, parent: ParentKey) -> Option<BTreeMap<ChildKey, String>> {
        let mut state = self.state();
        let collection = state.live(parent)?;
        Some(
            collection
                .fields
                .iter()
                .filter(|(field, _)| !is_sentinel(field))
                .filter_map(|(field, value)| {
                    field.parse::<i64>().ok().map(|id| (ChildKey(id), value.clone()))
                })
                .collect(),
        )
    }

    /// True when the stored hash holds the sentinel field.
    pub fn has_sentinel(&self, parent: ParentKey) -> bool {
        self.state()
            .live(parent)
            .map(|c| c.fields.contains_key(SENTINEL_FIELD))
            .unwrap_or(false)
    }
}

#[async_trait::async_trait]
impl CollectionCache for MemoryCollectionCache {
    async fn exists(&self, parent: ParentKey) -> CacheResult<bool> {
        let mut state = self.lock()?;
        Ok(state
            .live(parent)
            .map(|c| c.fields.contains_key(SENTINEL_FIELD))
            .unwrap_or(false))
    }

    async fn has_child(&self, key: CacheKey) -> CacheResult<bool> {
        let field = child_field(key.child)?;
        let mut state = self.lock()?;
        Ok(state
            .live(key.parent)
            .map(|c| c.fields.contains_key(&field))
            .unwrap_or(false))
    }

    async fn list(&self, parent: ParentKey) -> CacheResult<Option<Vec<String>>> {
        let mut state = self.lock()?;
        Ok(state
            .live(parent)
            .filter(|c| c.fields.contains_key(SENTINEL_FIELD))
            .map(|c| {
                c.fields
                    .iter()
                    .filter(|(field, _)| !is_sentinel(field))
                    .map(|(_, value)| value.clone())
                    .collect()
            }))
    }

    async fn put_child(&self, key: CacheKey, value: String) -> CacheResult<bool> {
        let field = child_field(key.child)?;
        let mut state = self.lock()?;
        match state.live(key.parent) {
            Some(collection) if collection.fields.contains_key(SENTINEL_FIELD) => {
                collection.fields.insert(field, value);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn remove_child(&self, key: CacheKey) -> CacheResult<()> {
        let field = child_field(key.child)?;
        let mut state = self.lock()?;
        if let Some(collection) = state.live(key.parent) {
            collection.fields.remove(&field);
        }
        Ok(())
    }

    async fn materialize(
        &self,
        parent: ParentKey,
        children: Vec<(ChildKey, String)>,
    ) -> CacheResult<Duration> {
        let mut fields = BTreeMap::new();
        fields.insert(SENTINEL_FIELD.to_string(), String::new());
        for (child, value) in children {
            fields.insert(child_field(child)?, value);
        }
        let ttl = self.ttl.sample();

        let mut state = self.lock()?;
        state.collections.insert(
            parent,
            Collection {
                fields,
                ttl,
                expires_at: Instant::now() + ttl,
            },
        );
        state.materializations += 1;
        Ok(ttl)
    }
}
