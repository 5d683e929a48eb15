use collection_cache::{ChildKey, ParentKey};
use tracing::info;

use crate::cache_aside::{CacheAsideRepository, ChildStore, RepositoryError};
use crate::domain::models::{Comment, NewComment};
use crate::error::{ServiceError, ServiceResult};
use crate::repository::CommentStore;

/// Maximum comment length in characters
pub const MAX_COMMENT_CHARS: usize = 1000;

/// Comment operations for videos
pub struct CommentService<S = CommentStore>
where
    S: ChildStore<Record = Comment, Draft = NewComment>,
{
    repo: CacheAsideRepository<S>,
}

impl<S> CommentService<S>
where
    S: ChildStore<Record = Comment, Draft = NewComment>,
{
    pub fn new(repo: CacheAsideRepository<S>) -> Self {
        Self { repo }
    }

    /// Post a comment on a video
    pub async fn create_comment(
        &self,
        video_id: i64,
        user_id: i64,
        content: &str,
    ) -> ServiceResult<Comment> {
        super::require_id("video_id", video_id)?;
        super::require_id("user_id", user_id)?;

        let content = content.trim();
        if content.is_empty() {
            return Err(RepositoryError::InvalidArgument("comment text is empty".into()).into());
        }
        if content.chars().count() > MAX_COMMENT_CHARS {
            return Err(RepositoryError::InvalidArgument(format!(
                "comment exceeds {} characters",
                MAX_COMMENT_CHARS
            ))
            .into());
        }

        let comment = self
            .repo
            .create_child(NewComment {
                video_id,
                user_id,
                content: content.to_string(),
            })
            .await?
            .ok_or_else(|| ServiceError::Internal("comment insert returned no row".into()))?;

        info!(video_id, comment_id = comment.id, user_id, "Comment created");
        Ok(comment)
    }

    /// Delete a comment; only its author may do so
    pub async fn delete_comment(
        &self,
        video_id: i64,
        comment_id: i64,
        user_id: i64,
    ) -> ServiceResult<Comment> {
        super::require_id("video_id", video_id)?;
        super::require_id("comment_id", comment_id)?;

        let parent = ParentKey(video_id);
        let child = ChildKey(comment_id);

        let existing = self
            .repo
            .find_child(parent, child)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("comment {}", comment_id)))?;
        if existing.user_id != user_id {
            return Err(ServiceError::PermissionDenied(
                "only the author can delete a comment".into(),
            ));
        }

        let deleted = self
            .repo
            .delete_child(parent, child)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("comment {}", comment_id)))?;

        info!(video_id, comment_id, user_id, "Comment deleted");
        Ok(deleted)
    }

    /// Comments of a video, newest first
    pub async fn list_comments(&self, video_id: i64) -> ServiceResult<Vec<Comment>> {
        super::require_id("video_id", video_id)?;
        Ok(self.repo.read_collection(ParentKey(video_id)).await?)
    }
}
