use chrono::{DateTime, Utc};
use collection_cache::{ChildKey, ParentKey};
use counter_propagation::{CounterKind, DeltaEvent};
use sqlx::PgPool;
use std::collections::HashSet;

use crate::cache_aside::{ChildRecord, ChildStore, StoreResult, WriteOp};
use crate::domain::models::{Favorite, NewFavorite};

impl ChildRecord for Favorite {
    fn parent_key(&self) -> ParentKey {
        ParentKey(self.user_id)
    }

    fn child_key(&self) -> ChildKey {
        ChildKey(self.video_id)
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Video favorite count, user favorite count, author total_favorited
    fn counter_deltas(&self, op: WriteOp) -> Vec<DeltaEvent> {
        let delta = match op {
            WriteOp::Create => 1,
            WriteOp::Delete => -1,
        };
        vec![
            DeltaEvent::new(CounterKind::VideoFavoriteCount, self.video_id, delta),
            DeltaEvent::new(CounterKind::UserFavoriteCount, self.user_id, delta),
            DeltaEvent::new(CounterKind::UserTotalFavorited, self.author_id, delta),
        ]
    }
}

/// Favorited videos of a user (parent = user, child = video)
#[derive(Clone)]
pub struct FavoriteStore {
    pool: PgPool,
}

impl FavoriteStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ChildStore for FavoriteStore {
    type Record = Favorite;
    type Draft = NewFavorite;

    async fn list_children(&self, parent: ParentKey) -> StoreResult<Vec<Favorite>> {
        let favorites = sqlx::query_as::<_, Favorite>(
            r#"
            SELECT user_id, video_id, author_id, created_at
            FROM favorites
            WHERE user_id = $1
            ORDER BY created_at DESC, video_id DESC
            "#,
        )
        .bind(parent.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(favorites)
    }

    async fn find_child(&self, parent: ParentKey, child: ChildKey) -> StoreResult<Option<Favorite>> {
        let favorite = sqlx::query_as::<_, Favorite>(
            r#"
            SELECT user_id, video_id, author_id, created_at
            FROM favorites
            WHERE user_id = $1 AND video_id = $2
            "#,
        )
        .bind(parent.0)
        .bind(child.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(favorite)
    }

    async fn find_members(
        &self,
        parent: ParentKey,
        children: &[ChildKey],
    ) -> StoreResult<HashSet<ChildKey>> {
        let found: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT video_id FROM favorites
            WHERE user_id = $1 AND video_id = ANY($2)
            "#,
        )
        .bind(parent.0)
        .bind(super::ids(children))
        .fetch_all(&self.pool)
        .await?;

        Ok(found.into_iter().map(ChildKey).collect())
    }

    /// Idempotent: favoriting twice returns `None` the second time.
    async fn insert_child(&self, draft: NewFavorite) -> StoreResult<Option<Favorite>> {
        let favorite = sqlx::query_as::<_, Favorite>(
            r#"
            INSERT INTO favorites (user_id, video_id, author_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, video_id) DO NOTHING
            RETURNING user_id, video_id, author_id, created_at
            "#,
        )
        .bind(draft.user_id)
        .bind(draft.video_id)
        .bind(draft.author_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(favorite)
    }

    async fn delete_child(&self, parent: ParentKey, child: ChildKey) -> StoreResult<Option<Favorite>> {
        let favorite = sqlx::query_as::<_, Favorite>(
            r#"
            DELETE FROM favorites
            WHERE user_id = $1 AND video_id = $2
            RETURNING user_id, video_id, author_id, created_at
            "#,
        )
        .bind(parent.0)
        .bind(child.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(favorite)
    }
}
