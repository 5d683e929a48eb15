use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache_aside::RepositoryError;

/// Comment entity - a comment on a video
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Comment {
    pub id: i64,
    pub video_id: i64,
    pub user_id: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Input for a new comment; the id is assigned by the store
#[derive(Debug, Clone)]
pub struct NewComment {
    pub video_id: i64,
    pub user_id: i64,
    pub content: String,
}

/// Favorite edge - a user favoriting a video
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Favorite {
    pub user_id: i64,
    pub video_id: i64,
    /// Author of the favorited video, kept for total_favorited deltas
    pub author_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewFavorite {
    pub user_id: i64,
    pub video_id: i64,
    pub author_id: i64,
}

/// Follow edge - follower -> followee
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Follow {
    pub follower_id: i64,
    pub followee_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewFollow {
    pub follower_id: i64,
    pub followee_id: i64,
}

/// Action codes accepted by favorite and follow endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionType {
    Create,
    Delete,
}

impl TryFrom<i32> for ActionType {
    type Error = RepositoryError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ActionType::Create),
            2 => Ok(ActionType::Delete),
            other => Err(RepositoryError::InvalidActionType(other)),
        }
    }
}
