//! Service wiring shared by the binary and transports

use collection_cache::{CollectionCache, KeySpace, RedisCollectionCache};
use counter_propagation::DeltaPublisher;
use redis::aio::ConnectionManager;
use sqlx::PgPool;
use std::sync::Arc;

use crate::cache_aside::{CacheAsideRepository, TaskPool};
use crate::config::CacheConfig;
use crate::repository::{CommentStore, FavoriteStore, FollowStore};
use crate::services::{CommentService, FavoriteService, FollowService};

/// Cache key space per domain
pub const COMMENT_DOMAIN: &str = "comment";
pub const FAVORITE_DOMAIN: &str = "favorite";
pub const FOLLOW_DOMAIN: &str = "follow";

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub comments: Arc<CommentService>,
    pub favorites: Arc<FavoriteService>,
    pub follows: Arc<FollowService>,
    pub tasks: TaskPool,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        redis: ConnectionManager,
        cache_config: CacheConfig,
        publisher: Arc<dyn DeltaPublisher>,
        tasks: TaskPool,
    ) -> Self {
        let cache = |domain: &str| -> Arc<dyn CollectionCache> {
            Arc::new(RedisCollectionCache::new(
                redis.clone(),
                KeySpace::new(domain),
                cache_config.ttl,
            ))
        };

        let comments = CacheAsideRepository::new(
            COMMENT_DOMAIN,
            Arc::new(CommentStore::new(pool.clone())),
            cache(COMMENT_DOMAIN),
            publisher.clone(),
            tasks.clone(),
        );
        let favorites = CacheAsideRepository::new(
            FAVORITE_DOMAIN,
            Arc::new(FavoriteStore::new(pool.clone())),
            cache(FAVORITE_DOMAIN),
            publisher.clone(),
            tasks.clone(),
        );
        let follows = CacheAsideRepository::new(
            FOLLOW_DOMAIN,
            Arc::new(FollowStore::new(pool.clone())),
            cache(FOLLOW_DOMAIN),
            publisher,
            tasks.clone(),
        );

        Self {
            pool,
            comments: Arc::new(CommentService::new(comments)),
            favorites: Arc::new(FavoriteService::new(favorites)),
            follows: Arc::new(FollowService::new(follows)),
            tasks,
        }
    }
}
