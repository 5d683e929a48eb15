//! Cache-aside repository over one child store
//!
//! Reads consult the collection cache first and fall back to the store,
//! backfilling the cache in the background. Writes commit to the store, then
//! hand cache maintenance and counter deltas to the task pool.

use collection_cache::{CacheKey, ChildKey, CollectionCache, ParentKey};
use counter_propagation::{DeltaEvent, DeltaPublisher};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::error::{RepositoryError, RepositoryResult};
use super::store::{ChildRecord, ChildStore, WriteOp};
use super::task_pool::TaskPool;

/// Generic cache-aside repository shared by the comment, favorite and follow domains.
pub struct CacheAsideRepository<S: ChildStore> {
    domain: &'static str,
    store: Arc<S>,
    cache: Arc<dyn CollectionCache>,
    publisher: Arc<dyn DeltaPublisher>,
    tasks: TaskPool,
}

impl<S: ChildStore> Clone for CacheAsideRepository<S> {
    fn clone(&self) -> Self {
        Self {
            domain: self.domain,
            store: self.store.clone(),
            cache: self.cache.clone(),
            publisher: self.publisher.clone(),
            tasks: self.tasks.clone(),
        }
    }
}

impl<S: ChildStore> CacheAsideRepository<S> {
    pub fn new(
        domain: &'static str,
        store: Arc<S>,
        cache: Arc<dyn CollectionCache>,
        publisher: Arc<dyn DeltaPublisher>,
        tasks: TaskPool,
    ) -> Self {
        Self {
            domain,
            store,
            cache,
            publisher,
            tasks,
        }
    }

    pub fn domain(&self) -> &'static str {
        self.domain
    }

    /// All children of `parent`, newest first.
    pub async fn read_collection(&self, parent: ParentKey) -> RepositoryResult<Vec<S::Record>> {
        match self.cache.exists(parent).await {
            Ok(true) => match self.cached_children(parent).await {
                Ok(Some(mut records)) => {
                    debug!(domain = self.domain, parent = %parent, "Collection cache hit");
                    sort_newest_first(&mut records);
                    Ok(records)
                }
                Err(RepositoryError::SerializationFailed(e)) => {
                    // Unreadable entries: serve from the store and rebuild
                    warn!(
                        domain = self.domain,
                        parent = %parent,
                        error = %e,
                        "Corrupt cached collection, rebuilding"
                    );
                    self.load_and_backfill(parent).await
                }
                Ok(None) => {
                    debug!(domain = self.domain, parent = %parent, "Collection expired after lookup");
                    self.load_and_backfill(parent).await
                }
                Err(e) => {
                    warn!(domain = self.domain, parent = %parent, error = %e, "Cache list failed");
                    self.load_from_store(parent).await
                }
            },
            Ok(false) => {
                debug!(domain = self.domain, parent = %parent, "Collection cache miss");
                self.load_and_backfill(parent).await
            }
            Err(e) => {
                warn!(domain = self.domain, parent = %parent, error = %e, "Cache lookup failed");
                self.load_from_store(parent).await
            }
        }
    }

    /// Single child straight from the store.
    pub async fn find_child(
        &self,
        parent: ParentKey,
        child: ChildKey,
    ) -> RepositoryResult<Option<S::Record>> {
        self.store
            .find_child(parent, child)
            .await
            .map_err(RepositoryError::query)
    }

    /// Insert a child. `Ok(None)` when it already existed; nothing is
    /// propagated in that case.
    pub async fn create_child(&self, draft: S::Draft) -> RepositoryResult<Option<S::Record>> {
        let record = match self
            .store
            .insert_child(draft)
            .await
            .map_err(RepositoryError::write)?
        {
            Some(record) => record,
            None => return Ok(None),
        };

        self.after_write(WriteOp::Create, &record);
        Ok(Some(record))
    }

    /// Delete a child. `Ok(None)` when it did not exist.
    pub async fn delete_child(
        &self,
        parent: ParentKey,
        child: ChildKey,
    ) -> RepositoryResult<Option<S::Record>> {
        let record = match self
            .store
            .delete_child(parent, child)
            .await
            .map_err(RepositoryError::write)?
        {
            Some(record) => record,
            None => return Ok(None),
        };

        self.after_write(WriteOp::Delete, &record);
        Ok(Some(record))
    }

    /// Membership of each of `children` under `parent`, in request order.
    pub async fn is_member(
        &self,
        parent: ParentKey,
        children: &[ChildKey],
    ) -> RepositoryResult<Vec<bool>> {
        if children.is_empty() {
            return Ok(Vec::new());
        }

        match self.cache.exists(parent).await {
            Ok(true) => match self.cached_membership(parent, children).await {
                Ok(answers) => return Ok(answers),
                Err(e) => {
                    warn!(domain = self.domain, parent = %parent, error = %e, "Cache membership lookup failed");
                }
            },
            Ok(false) => {
                let members = self
                    .store
                    .find_members(parent, children)
                    .await
                    .map_err(RepositoryError::query)?;
                self.schedule_backfill(parent);
                return Ok(children.iter().map(|c| members.contains(c)).collect());
            }
            Err(e) => {
                warn!(domain = self.domain, parent = %parent, error = %e, "Cache lookup failed");
            }
        }

        let members = self
            .store
            .find_members(parent, children)
            .await
            .map_err(RepositoryError::query)?;
        Ok(children.iter().map(|c| members.contains(c)).collect())
    }

    /// `None` when the collection vanished since the existence check.
    async fn cached_children(&self, parent: ParentKey) -> RepositoryResult<Option<Vec<S::Record>>> {
        let raw = match self.cache.list(parent).await? {
            Some(raw) => raw,
            None => return Ok(None),
        };
        raw.iter()
            .map(|value| serde_json::from_str::<S::Record>(value).map_err(RepositoryError::from))
            .collect::<RepositoryResult<Vec<_>>>()
            .map(Some)
    }

    async fn cached_membership(
        &self,
        parent: ParentKey,
        children: &[ChildKey],
    ) -> RepositoryResult<Vec<bool>> {
        let mut seen: HashMap<ChildKey, bool> = HashMap::with_capacity(children.len());
        let mut answers = Vec::with_capacity(children.len());

        for child in children {
            let present = match seen.get(child) {
                Some(present) => *present,
                None => {
                    let present = self.cache.has_child(CacheKey::new(parent, *child)).await?;
                    seen.insert(*child, present);
                    present
                }
            };
            answers.push(present);
        }
        Ok(answers)
    }

    async fn load_from_store(&self, parent: ParentKey) -> RepositoryResult<Vec<S::Record>> {
        let mut records = self
            .store
            .list_children(parent)
            .await
            .map_err(RepositoryError::query)?;
        sort_newest_first(&mut records);
        Ok(records)
    }

    async fn load_and_backfill(&self, parent: ParentKey) -> RepositoryResult<Vec<S::Record>> {
        let records = self.load_from_store(parent).await?;
        self.schedule_materialize(parent, records.clone());
        Ok(records)
    }

    /// Materialize `records` as the collection of `parent`, even when empty.
    fn schedule_materialize(&self, parent: ParentKey, records: Vec<S::Record>) {
        let cache = self.cache.clone();
        let domain = self.domain;

        self.tasks.submit("cache_materialize", async move {
            if let Err(e) = materialize(cache.as_ref(), parent, &records).await {
                warn!(domain, parent = %parent, error = %e, "Cache backfill failed");
            }
        });
    }

    /// Reload `parent` from the store and materialize it.
    fn schedule_backfill(&self, parent: ParentKey) {
        let cache = self.cache.clone();
        let store = self.store.clone();
        let domain = self.domain;

        self.tasks.submit("cache_backfill", async move {
            let records = match store.list_children(parent).await {
                Ok(records) => records,
                Err(e) => {
                    warn!(domain, parent = %parent, error = %e, "Backfill query failed");
                    return;
                }
            };
            if let Err(e) = materialize(cache.as_ref(), parent, &records).await {
                warn!(domain, parent = %parent, error = %e, "Cache backfill failed");
            }
        });
    }

    fn after_write(&self, op: WriteOp, record: &S::Record) {
        self.schedule_cache_write(op, record.clone());

        let deltas = record.counter_deltas(op);
        if !deltas.is_empty() {
            self.schedule_deltas(deltas);
        }
    }

    /// Apply one child write to an already materialized collection.
    /// Absent collections are left alone; the next miss rebuilds them.
    fn schedule_cache_write(&self, op: WriteOp, record: S::Record) {
        let cache = self.cache.clone();
        let domain = self.domain;

        self.tasks.submit("cache_write", async move {
            let key = CacheKey::new(record.parent_key(), record.child_key());
            let result = match op {
                WriteOp::Create => match serde_json::to_string(&record) {
                    Ok(value) => cache
                        .put_child(key, value)
                        .await
                        .map(|_| ())
                        .map_err(RepositoryError::from),
                    Err(e) => Err(RepositoryError::from(e)),
                },
                WriteOp::Delete => cache
                    .remove_child(key)
                    .await
                    .map_err(RepositoryError::from),
            };

            if let Err(e) = result {
                warn!(
                    domain,
                    parent = %key.parent,
                    child = %key.child,
                    op = ?op,
                    error = %e,
                    "Cache child write failed"
                );
            }
        });
    }

    fn schedule_deltas(&self, deltas: Vec<DeltaEvent>) {
        let publisher = self.publisher.clone();
        let domain = self.domain;

        self.tasks.submit("counter_delta", async move {
            for event in &deltas {
                if let Err(e) = publisher.emit(event).await {
                    let e = RepositoryError::from(e);
                    warn!(
                        domain,
                        counter = %event.counter,
                        entity_id = event.entity_id,
                        delta = event.delta,
                        error = %e,
                        "Counter delta dropped"
                    );
                }
            }
        });
    }
}

async fn materialize<R: ChildRecord>(
    cache: &dyn CollectionCache,
    parent: ParentKey,
    records: &[R],
) -> RepositoryResult<()> {
    let mut children = Vec::with_capacity(records.len());
    for record in records {
        children.push((record.child_key(), serde_json::to_string(record)?));
    }
    cache.materialize(parent, children).await?;
    Ok(())
}

fn sort_newest_first<R: ChildRecord>(records: &mut [R]) {
    records.sort_by(|a, b| {
        b.created_at()
            .cmp(&a.created_at())
            .then_with(|| b.child_key().cmp(&a.child_key()))
    });
}
