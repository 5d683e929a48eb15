use collection_cache::{ChildKey, ParentKey};
use tracing::info;

use crate::cache_aside::{CacheAsideRepository, ChildStore};
use crate::domain::models::{ActionType, Favorite, NewFavorite};
use crate::error::ServiceResult;
use crate::repository::FavoriteStore;

/// Favorite (like) operations between users and videos
pub struct FavoriteService<S = FavoriteStore>
where
    S: ChildStore<Record = Favorite, Draft = NewFavorite>,
{
    repo: CacheAsideRepository<S>,
}

impl<S> FavoriteService<S>
where
    S: ChildStore<Record = Favorite, Draft = NewFavorite>,
{
    pub fn new(repo: CacheAsideRepository<S>) -> Self {
        Self { repo }
    }

    /// Favorite (1) or unfavorite (2) a video.
    ///
    /// Returns whether anything changed; repeating an action is a no-op.
    pub async fn favorite_action(
        &self,
        user_id: i64,
        video_id: i64,
        author_id: i64,
        action_type: i32,
    ) -> ServiceResult<bool> {
        let action = ActionType::try_from(action_type)?;
        super::require_id("user_id", user_id)?;
        super::require_id("video_id", video_id)?;

        let changed = match action {
            ActionType::Create => {
                super::require_id("author_id", author_id)?;
                self.repo
                    .create_child(NewFavorite {
                        user_id,
                        video_id,
                        author_id,
                    })
                    .await?
                    .is_some()
            }
            ActionType::Delete => self
                .repo
                .delete_child(ParentKey(user_id), ChildKey(video_id))
                .await?
                .is_some(),
        };

        info!(user_id, video_id, action = ?action, changed, "Favorite action");
        Ok(changed)
    }

    /// Videos favorited by a user, most recent first
    pub async fn list_favorites(&self, user_id: i64) -> ServiceResult<Vec<Favorite>> {
        super::require_id("user_id", user_id)?;
        Ok(self.repo.read_collection(ParentKey(user_id)).await?)
    }

    /// Whether the user favorited each of `video_ids`, in order
    pub async fn is_favorited(&self, user_id: i64, video_ids: &[i64]) -> ServiceResult<Vec<bool>> {
        super::require_id("user_id", user_id)?;
        let children: Vec<ChildKey> = video_ids.iter().copied().map(ChildKey).collect();
        Ok(self.repo.is_member(ParentKey(user_id), &children).await?)
    }
}
