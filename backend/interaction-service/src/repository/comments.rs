use chrono::{DateTime, Utc};
use collection_cache::{ChildKey, ParentKey};
use counter_propagation::{CounterKind, DeltaEvent};
use sqlx::PgPool;
use std::collections::HashSet;

use crate::cache_aside::{ChildRecord, ChildStore, StoreResult, WriteOp};
use crate::domain::models::{Comment, NewComment};

impl ChildRecord for Comment {
    fn parent_key(&self) -> ParentKey {
        ParentKey(self.video_id)
    }

    fn child_key(&self) -> ChildKey {
        ChildKey(self.id)
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn counter_deltas(&self, op: WriteOp) -> Vec<DeltaEvent> {
        let event = match op {
            WriteOp::Create => DeltaEvent::increment(CounterKind::VideoCommentCount, self.video_id),
            WriteOp::Delete => DeltaEvent::decrement(CounterKind::VideoCommentCount, self.video_id),
        };
        vec![event]
    }
}

/// Comments of a video (parent = video, child = comment)
#[derive(Clone)]
pub struct CommentStore {
    pool: PgPool,
}

impl CommentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ChildStore for CommentStore {
    type Record = Comment;
    type Draft = NewComment;

    async fn list_children(&self, parent: ParentKey) -> StoreResult<Vec<Comment>> {
        let comments = sqlx::query_as::<_, Comment>(
            r#"
            SELECT id, video_id, user_id, content, created_at
            FROM comments
            WHERE video_id = $1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(parent.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(comments)
    }

    async fn find_child(&self, parent: ParentKey, child: ChildKey) -> StoreResult<Option<Comment>> {
        let comment = sqlx::query_as::<_, Comment>(
            r#"
            SELECT id, video_id, user_id, content, created_at
            FROM comments
            WHERE video_id = $1 AND id = $2
            "#,
        )
        .bind(parent.0)
        .bind(child.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(comment)
    }

    async fn find_members(
        &self,
        parent: ParentKey,
        children: &[ChildKey],
    ) -> StoreResult<HashSet<ChildKey>> {
        let found: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT id FROM comments
            WHERE video_id = $1 AND id = ANY($2)
            "#,
        )
        .bind(parent.0)
        .bind(super::ids(children))
        .fetch_all(&self.pool)
        .await?;

        Ok(found.into_iter().map(ChildKey).collect())
    }

    async fn insert_child(&self, draft: NewComment) -> StoreResult<Option<Comment>> {
        let comment = sqlx::query_as::<_, Comment>(
            r#"
            INSERT INTO comments (video_id, user_id, content)
            VALUES ($1, $2, $3)
            RETURNING id, video_id, user_id, content, created_at
            "#,
        )
        .bind(draft.video_id)
        .bind(draft.user_id)
        .bind(draft.content)
        .fetch_one(&self.pool)
        .await?;

        Ok(Some(comment))
    }

    async fn delete_child(&self, parent: ParentKey, child: ChildKey) -> StoreResult<Option<Comment>> {
        let comment = sqlx::query_as::<_, Comment>(
            r#"
            DELETE FROM comments
            WHERE video_id = $1 AND id = $2
            RETURNING id, video_id, user_id, content, created_at
            "#,
        )
        .bind(parent.0)
        .bind(child.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(comment)
    }
}
