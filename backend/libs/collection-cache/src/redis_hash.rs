//! Redis hash-backed collection cache
//!
//! One hash per parent: `v1:{domain}:{parent_id}` holding one field per child
//! plus the sentinel field `-1` with an empty value.

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::keys::{child_field, is_sentinel, SENTINEL_FIELD};
use crate::{
    CacheError, CacheKey, CacheMetrics, CacheResult, ChildKey, CollectionCache, KeySpace,
    ParentKey, TtlWindow,
};

/// HSET only when the sentinel is present, checked and applied in one step.
/// KEYS[1] = collection, ARGV[1] = sentinel field, ARGV[2] = child field, ARGV[3] = value
const PUT_IF_MATERIALIZED: &str = r#"
if redis.call('HEXISTS', KEYS[1], ARGV[1]) == 1 then
    redis.call('HSET', KEYS[1], ARGV[2], ARGV[3])
    return 1
end
return 0
"#;

/// Open a Redis connection manager for the given URL.
pub async fn connect(redis_url: &str) -> CacheResult<ConnectionManager> {
    let client = Client::open(redis_url)?;
    let manager = ConnectionManager::new(client).await?;
    Ok(manager)
}

/// Collection cache over Redis hashes
#[derive(Clone)]
pub struct RedisCollectionCache {
    redis: ConnectionManager,
    keyspace: KeySpace,
    ttl: TtlWindow,
    metrics: CacheMetrics,
    put_script: Script,
}

impl RedisCollectionCache {
    pub fn new(redis: ConnectionManager, keyspace: KeySpace, ttl: TtlWindow) -> Self {
        let metrics = CacheMetrics::new(keyspace.domain());
        Self {
            redis,
            keyspace,
            ttl,
            metrics,
            put_script: Script::new(PUT_IF_MATERIALIZED),
        }
    }

    pub fn keyspace(&self) -> &KeySpace {
        &self.keyspace
    }

    fn fail<T>(&self, operation: &str, key: &str, err: CacheError) -> CacheResult<T> {
        warn!(key = %key, operation = operation, error = %err, "Redis collection operation failed");
        self.metrics.record_error(operation);
        Err(err)
    }
}

#[async_trait::async_trait]
impl CollectionCache for RedisCollectionCache {
    async fn exists(&self, parent: ParentKey) -> CacheResult<bool> {
        let key = self.keyspace.collection_key(parent)?;
        let mut conn = self.redis.clone();

        match conn.hexists::<_, _, bool>(&key, SENTINEL_FIELD).await {
            Ok(materialized) => {
                self.metrics.record_lookup(materialized);
                Ok(materialized)
            }
            Err(e) => self.fail("exists", &key, CacheError::Redis(e)),
        }
    }

    async fn has_child(&self, key: CacheKey) -> CacheResult<bool> {
        let collection = self.keyspace.collection_key(key.parent)?;
        let field = child_field(key.child)?;
        let mut conn = self.redis.clone();

        match conn.hexists::<_, _, bool>(&collection, &field).await {
            Ok(present) => Ok(present),
            Err(e) => self.fail("has_child", &collection, CacheError::Redis(e)),
        }
    }

    async fn list(&self, parent: ParentKey) -> CacheResult<Option<Vec<String>>> {
        let key = self.keyspace.collection_key(parent)?;
        let mut conn = self.redis.clone();

        let fields: HashMap<String, String> = match conn.hgetall(&key).await {
            Ok(fields) => fields,
            Err(e) => return self.fail("list", &key, CacheError::Redis(e)),
        };

        // HGETALL on an expired key is an empty map
        if !fields.contains_key(SENTINEL_FIELD) {
            debug!(key = %key, "Collection gone before listing");
            return Ok(None);
        }

        let children: Vec<String> = fields
            .into_iter()
            .filter(|(field, _)| !is_sentinel(field))
            .map(|(_, value)| value)
            .collect();

        debug!(key = %key, count = children.len(), "Collection listed");
        Ok(Some(children))
    }

    async fn put_child(&self, key: CacheKey, value: String) -> CacheResult<bool> {
        let collection = self.keyspace.collection_key(key.parent)?;
        let field = child_field(key.child)?;
        let mut conn = self.redis.clone();

        let applied: i32 = match self
            .put_script
            .key(&collection)
            .arg(SENTINEL_FIELD)
            .arg(&field)
            .arg(value)
            .invoke_async(&mut conn)
            .await
        {
            Ok(applied) => applied,
            Err(e) => return self.fail("put_child", &collection, CacheError::Redis(e)),
        };

        if applied == 1 {
            self.metrics.record_child_write();
            debug!(key = %collection, field = %field, "Child written");
        } else {
            debug!(key = %collection, field = %field, "Collection not materialized, child write skipped");
        }
        Ok(applied == 1)
    }

    async fn remove_child(&self, key: CacheKey) -> CacheResult<()> {
        let collection = self.keyspace.collection_key(key.parent)?;
        let field = child_field(key.child)?;
        let mut conn = self.redis.clone();

        if let Err(e) = conn.hdel::<_, _, ()>(&collection, &field).await {
            return self.fail("remove_child", &collection, CacheError::Redis(e));
        }

        self.metrics.record_child_eviction();
        debug!(key = %collection, field = %field, "Child removed");
        Ok(())
    }

    async fn materialize(
        &self,
        parent: ParentKey,
        children: Vec<(ChildKey, String)>,
    ) -> CacheResult<Duration> {
        let key = self.keyspace.collection_key(parent)?;
        let mut fields = Vec::with_capacity(children.len());
        for (child, value) in children {
            fields.push((child_field(child)?, value));
        }
        let ttl = self.ttl.sample();

        // MULTI/EXEC: replace, sentinel, children and TTL commit together
        let mut pipe = redis::pipe();
        pipe.atomic()
            .del(&key)
            .ignore()
            .hset(&key, SENTINEL_FIELD, "")
            .ignore();
        if !fields.is_empty() {
            pipe.hset_multiple(&key, &fields).ignore();
        }
        pipe.expire(&key, ttl.as_secs() as i64).ignore();

        let mut conn = self.redis.clone();
        if let Err(e) = pipe.query_async::<_, ()>(&mut conn).await {
            return self.fail(
                "materialize",
                &key,
                CacheError::Transaction(e.to_string()),
            );
        }

        self.metrics.record_materialization();
        debug!(
            key = %key,
            children = fields.len(),
            ttl_secs = ttl.as_secs(),
            "Collection materialized"
        );
        Ok(ttl)
    }
}
