use collection_cache::{ChildKey, ParentKey};
use tracing::info;

use crate::cache_aside::{CacheAsideRepository, ChildStore, RepositoryError};
use crate::domain::models::{ActionType, Follow, NewFollow};
use crate::error::ServiceResult;
use crate::repository::FollowStore;

/// Follow relation operations
pub struct FollowService<S = FollowStore>
where
    S: ChildStore<Record = Follow, Draft = NewFollow>,
{
    repo: CacheAsideRepository<S>,
}

impl<S> FollowService<S>
where
    S: ChildStore<Record = Follow, Draft = NewFollow>,
{
    pub fn new(repo: CacheAsideRepository<S>) -> Self {
        Self { repo }
    }

    /// Follow (1) or unfollow (2) a user. Returns whether anything changed.
    pub async fn follow_action(
        &self,
        follower_id: i64,
        followee_id: i64,
        action_type: i32,
    ) -> ServiceResult<bool> {
        let action = ActionType::try_from(action_type)?;
        super::require_id("follower_id", follower_id)?;
        super::require_id("followee_id", followee_id)?;
        if follower_id == followee_id {
            return Err(RepositoryError::InvalidArgument("cannot follow yourself".into()).into());
        }

        let changed = match action {
            ActionType::Create => self
                .repo
                .create_child(NewFollow {
                    follower_id,
                    followee_id,
                })
                .await?
                .is_some(),
            ActionType::Delete => self
                .repo
                .delete_child(ParentKey(follower_id), ChildKey(followee_id))
                .await?
                .is_some(),
        };

        info!(follower_id, followee_id, action = ?action, changed, "Follow action");
        Ok(changed)
    }

    /// Users followed by `user_id`, most recent first
    pub async fn list_following(&self, user_id: i64) -> ServiceResult<Vec<Follow>> {
        super::require_id("user_id", user_id)?;
        Ok(self.repo.read_collection(ParentKey(user_id)).await?)
    }

    /// Whether `user_id` follows each of `followee_ids`, in order
    pub async fn is_following(&self, user_id: i64, followee_ids: &[i64]) -> ServiceResult<Vec<bool>> {
        super::require_id("user_id", user_id)?;
        let children: Vec<ChildKey> = followee_ids.iter().copied().map(ChildKey).collect();
        Ok(self.repo.is_member(ParentKey(user_id), &children).await?)
    }
}
