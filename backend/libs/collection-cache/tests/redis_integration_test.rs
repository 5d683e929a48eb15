//! Integration tests for the Redis hash collection cache
//!
//! Prerequisites:
//! - Redis running locally or via Docker
//! - Environment variable: REDIS_URL
//!
//! Run tests:
//! ```bash
//! docker run --name redis-test -p 6379:6379 -d redis:7
//! export REDIS_URL="redis://127.0.0.1:6379"
//! cargo test --package collection-cache --test redis_integration_test -- --ignored
//! ```

use collection_cache::redis_hash::connect;
use collection_cache::{
    CacheKey, ChildKey, CollectionCache, KeySpace, ParentKey, RedisCollectionCache, TtlWindow,
};
use redis::AsyncCommands;
use std::env;

fn redis_url() -> String {
    env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

async fn test_cache(domain: &str) -> (RedisCollectionCache, redis::aio::ConnectionManager) {
    let conn = connect(&redis_url())
        .await
        .expect("Failed to connect to test Redis");
    let window = TtlWindow::from_minutes(10, 20).unwrap();
    let cache = RedisCollectionCache::new(conn.clone(), KeySpace::new(domain), window);
    (cache, conn)
}

async fn cleanup(conn: &mut redis::aio::ConnectionManager, key: &str) {
    let _: () = conn.del(key).await.expect("Failed to delete test key");
}

#[ignore = "Requires Redis"]
#[tokio::test]
async fn test_materialize_sets_sentinel_children_and_ttl() {
    let (cache, mut conn) = test_cache("it-comment").await;
    let parent = ParentKey(4_200_001);
    let key = format!("v1:it-comment:{}", parent.0);
    cleanup(&mut conn, &key).await;

    let ttl = cache
        .materialize(
            parent,
            vec![
                (ChildKey(1), "one".to_string()),
                (ChildKey(2), "two".to_string()),
            ],
        )
        .await
        .expect("materialize failed");

    let fields: std::collections::HashMap<String, String> = conn.hgetall(&key).await.unwrap();
    assert_eq!(fields.len(), 3);
    assert_eq!(fields.get("-1").map(String::as_str), Some(""));

    let remaining: i64 = conn.ttl(&key).await.unwrap();
    assert!(remaining > 0 && remaining as u64 <= ttl.as_secs());

    let mut listed = cache.list(parent).await.unwrap().expect("collection listed");
    listed.sort();
    assert_eq!(listed, vec!["one".to_string(), "two".to_string()]);

    cleanup(&mut conn, &key).await;
}

#[ignore = "Requires Redis"]
#[tokio::test]
async fn test_empty_collection_is_materialized() {
    let (cache, mut conn) = test_cache("it-follow").await;
    let parent = ParentKey(4_200_002);
    let key = format!("v1:it-follow:{}", parent.0);
    cleanup(&mut conn, &key).await;

    assert!(!cache.exists(parent).await.unwrap());
    cache.materialize(parent, Vec::new()).await.unwrap();

    assert!(cache.exists(parent).await.unwrap());
    assert_eq!(cache.list(parent).await.unwrap(), Some(Vec::new()));

    // Key gone between the existence check and the listing
    cleanup(&mut conn, &key).await;
    assert_eq!(cache.list(parent).await.unwrap(), None);
}

#[ignore = "Requires Redis"]
#[tokio::test]
async fn test_put_child_skips_unmaterialized_collection() {
    let (cache, mut conn) = test_cache("it-favorite").await;
    let parent = ParentKey(4_200_003);
    let key = format!("v1:it-favorite:{}", parent.0);
    cleanup(&mut conn, &key).await;

    let child = CacheKey::new(parent, ChildKey(9));
    assert!(!cache.put_child(child, "nine".into()).await.unwrap());
    let exists: bool = conn.exists(&key).await.unwrap();
    assert!(!exists, "put_child must not create a collection");

    cache.materialize(parent, Vec::new()).await.unwrap();
    assert!(cache.put_child(child, "nine".into()).await.unwrap());
    assert!(cache.has_child(child).await.unwrap());

    cache.remove_child(child).await.unwrap();
    assert!(!cache.has_child(child).await.unwrap());
    assert!(cache.exists(parent).await.unwrap());

    cleanup(&mut conn, &key).await;
}
