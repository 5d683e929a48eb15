//! Materialized collection cache
//!
//! Caches one-to-many relations (video -> comments, user -> favorites,
//! user -> followees) as one collection per parent:
//! - A reserved sentinel entry marks a collection as materialized, so an
//!   empty collection is a cache hit rather than a miss
//! - Materialization writes sentinel, children and TTL in one transaction
//! - TTLs are drawn from a window to avoid synchronized expiry
//! - Single-child writes only touch collections that are already materialized
//!
//! The sentinel never crosses the [`CollectionCache`] boundary.

mod error;
mod keys;
mod metrics;
mod ttl;

pub mod memory;
pub mod redis_hash;

pub use error::{CacheError, CacheResult};
pub use keys::{CacheKey, ChildKey, KeySpace, ParentKey, CACHE_VERSION};
pub use memory::MemoryCollectionCache;
pub use metrics::CacheMetrics;
pub use redis_hash::RedisCollectionCache;
pub use ttl::{TtlWindow, DEFAULT_TTL_MAX_MINUTES, DEFAULT_TTL_MIN_MINUTES};

use std::time::Duration;

/// Cache Store contract for per-parent collections of serialized children.
#[async_trait::async_trait]
pub trait CollectionCache: Send + Sync {
    /// True iff the parent's collection has been materialized.
    async fn exists(&self, parent: ParentKey) -> CacheResult<bool>;

    /// True iff the child is present in a materialized collection.
    async fn has_child(&self, key: CacheKey) -> CacheResult<bool>;

    /// All serialized children of the parent, sentinel excluded.
    /// `None` when the collection is not materialized at read time.
    async fn list(&self, parent: ParentKey) -> CacheResult<Option<Vec<String>>>;

    /// Upsert one child. Only applied while the collection is materialized;
    /// returns whether the write happened. Does not touch the TTL.
    async fn put_child(&self, key: CacheKey, value: String) -> CacheResult<bool>;

    /// Remove one child.
    async fn remove_child(&self, key: CacheKey) -> CacheResult<()>;

    /// Atomically replace the collection with the sentinel plus `children`
    /// and a TTL drawn from the configured window. Returns the applied TTL.
    async fn materialize(
        &self,
        parent: ParentKey,
        children: Vec<(ChildKey, String)>,
    ) -> CacheResult<Duration>;
}
