use chrono::{DateTime, Utc};
use collection_cache::{ChildKey, ParentKey};
use counter_propagation::{CounterKind, DeltaEvent};
use sqlx::PgPool;
use std::collections::HashSet;

use crate::cache_aside::{ChildRecord, ChildStore, StoreResult, WriteOp};
use crate::domain::models::{Follow, NewFollow};

impl ChildRecord for Follow {
    fn parent_key(&self) -> ParentKey {
        ParentKey(self.follower_id)
    }

    fn child_key(&self) -> ChildKey {
        ChildKey(self.followee_id)
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn counter_deltas(&self, op: WriteOp) -> Vec<DeltaEvent> {
        let delta = match op {
            WriteOp::Create => 1,
            WriteOp::Delete => -1,
        };
        vec![
            DeltaEvent::new(CounterKind::UserFollowCount, self.follower_id, delta),
            DeltaEvent::new(CounterKind::UserFollowerCount, self.followee_id, delta),
        ]
    }
}

/// Followees of a user (parent = follower, child = followee)
#[derive(Clone)]
pub struct FollowStore {
    pool: PgPool,
}

impl FollowStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ChildStore for FollowStore {
    type Record = Follow;
    type Draft = NewFollow;

    async fn list_children(&self, parent: ParentKey) -> StoreResult<Vec<Follow>> {
        let follows = sqlx::query_as::<_, Follow>(
            r#"
            SELECT follower_id, followee_id, created_at
            FROM follows
            WHERE follower_id = $1
            ORDER BY created_at DESC, followee_id DESC
            "#,
        )
        .bind(parent.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(follows)
    }

    async fn find_child(&self, parent: ParentKey, child: ChildKey) -> StoreResult<Option<Follow>> {
        let follow = sqlx::query_as::<_, Follow>(
            r#"
            SELECT follower_id, followee_id, created_at
            FROM follows
            WHERE follower_id = $1 AND followee_id = $2
            "#,
        )
        .bind(parent.0)
        .bind(child.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(follow)
    }

    async fn find_members(
        &self,
        parent: ParentKey,
        children: &[ChildKey],
    ) -> StoreResult<HashSet<ChildKey>> {
        let found: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT followee_id FROM follows
            WHERE follower_id = $1 AND followee_id = ANY($2)
            "#,
        )
        .bind(parent.0)
        .bind(super::ids(children))
        .fetch_all(&self.pool)
        .await?;

        Ok(found.into_iter().map(ChildKey).collect())
    }

    async fn insert_child(&self, draft: NewFollow) -> StoreResult<Option<Follow>> {
        let follow = sqlx::query_as::<_, Follow>(
            r#"
            INSERT INTO follows (follower_id, followee_id)
            VALUES ($1, $2)
            ON CONFLICT (follower_id, followee_id) DO NOTHING
            RETURNING follower_id, followee_id, created_at
            "#,
        )
        .bind(draft.follower_id)
        .bind(draft.followee_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(follow)
    }

    async fn delete_child(&self, parent: ParentKey, child: ChildKey) -> StoreResult<Option<Follow>> {
        let follow = sqlx::query_as::<_, Follow>(
            r#"
            DELETE FROM follows
            WHERE follower_id = $1 AND followee_id = $2
            RETURNING follower_id, followee_id, created_at
            "#,
        )
        .bind(parent.0)
        .bind(child.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(follow)
    }
}
