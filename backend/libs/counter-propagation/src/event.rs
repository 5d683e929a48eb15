//! Delta event model and wire format
//!
//! One topic per counter: `{prefix}.counter.{counter}`.
//! Message key: entity id as UTF-8 decimal (partitions by entity).
//! Message value: signed delta as UTF-8 decimal ("1", "-1").
//! Header `delta_id`: UUID used by the aggregator to drop redeliveries.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{PropagationError, PropagationResult};

/// Header carrying the per-delta idempotency key
pub const DELTA_ID_HEADER: &str = "delta_id";

/// Aggregate counters owned by downstream services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterKind {
    /// Comments on a video
    VideoCommentCount,
    /// Favorites received by a video
    VideoFavoriteCount,
    /// Videos a user has favorited
    UserFavoriteCount,
    /// Favorites received across all of an author's videos
    UserTotalFavorited,
    /// Users a user follows
    UserFollowCount,
    /// Users following a user
    UserFollowerCount,
}

impl CounterKind {
    pub const ALL: [CounterKind; 6] = [
        CounterKind::VideoCommentCount,
        CounterKind::VideoFavoriteCount,
        CounterKind::UserFavoriteCount,
        CounterKind::UserTotalFavorited,
        CounterKind::UserFollowCount,
        CounterKind::UserFollowerCount,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CounterKind::VideoCommentCount => "video_comment_count",
            CounterKind::VideoFavoriteCount => "video_favorite_count",
            CounterKind::UserFavoriteCount => "user_favorite_count",
            CounterKind::UserTotalFavorited => "user_total_favorited",
            CounterKind::UserFollowCount => "user_follow_count",
            CounterKind::UserFollowerCount => "user_follower_count",
        }
    }
}

impl fmt::Display for CounterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CounterKind {
    type Err = PropagationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CounterKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| PropagationError::UnknownTopic(s.to_string()))
    }
}

/// Maps counters to topics and back.
#[derive(Debug, Clone)]
pub struct CounterTopics {
    prefix: String,
}

impl CounterTopics {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// "video_comment_count" -> "nova.counter.video_comment_count"
    pub fn topic(&self, counter: CounterKind) -> String {
        format!("{}.counter.{}", self.prefix, counter.as_str())
    }

    pub fn all(&self) -> Vec<String> {
        CounterKind::ALL.iter().map(|c| self.topic(*c)).collect()
    }

    pub fn counter_for(&self, topic: &str) -> PropagationResult<CounterKind> {
        topic
            .strip_prefix(&self.prefix)
            .and_then(|rest| rest.strip_prefix(".counter."))
            .ok_or_else(|| PropagationError::UnknownTopic(topic.to_string()))?
            .parse()
    }
}

/// A signed unit change to a counter owned by another service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaEvent {
    pub counter: CounterKind,
    pub entity_id: i64,
    pub delta: i64,
    /// Idempotency key; absent on messages from producers that predate it
    pub delta_id: Option<Uuid>,
}

impl DeltaEvent {
    pub fn new(counter: CounterKind, entity_id: i64, delta: i64) -> Self {
        Self {
            counter,
            entity_id,
            delta,
            delta_id: Some(Uuid::new_v4()),
        }
    }

    pub fn increment(counter: CounterKind, entity_id: i64) -> Self {
        Self::new(counter, entity_id, 1)
    }

    pub fn decrement(counter: CounterKind, entity_id: i64) -> Self {
        Self::new(counter, entity_id, -1)
    }

    /// Message key (partition key)
    pub fn key(&self) -> String {
        self.entity_id.to_string()
    }

    /// Message value
    pub fn payload(&self) -> String {
        self.delta.to_string()
    }

    /// Rebuild a delta from a consumed message.
    pub fn decode(
        counter: CounterKind,
        key: Option<&[u8]>,
        payload: Option<&[u8]>,
        delta_id: Option<&[u8]>,
    ) -> PropagationResult<Self> {
        let entity_id = parse_decimal(key, "key")?;
        let delta = parse_decimal(payload, "payload")?;
        if delta == 0 {
            return Err(PropagationError::Malformed("zero delta".to_string()));
        }

        let delta_id = match delta_id {
            Some(raw) => {
                let text = std::str::from_utf8(raw)
                    .map_err(|e| PropagationError::Malformed(format!("delta_id: {}", e)))?;
                Some(
                    Uuid::parse_str(text)
                        .map_err(|e| PropagationError::Malformed(format!("delta_id: {}", e)))?,
                )
            }
            None => None,
        };

        Ok(Self {
            counter,
            entity_id,
            delta,
            delta_id,
        })
    }
}

fn parse_decimal(raw: Option<&[u8]>, what: &str) -> PropagationResult<i64> {
    let raw = raw.ok_or_else(|| PropagationError::Malformed(format!("missing {}", what)))?;
    std::str::from_utf8(raw)
        .map_err(|e| PropagationError::Malformed(format!("{}: {}", what, e)))?
        .trim()
        .parse::<i64>()
        .map_err(|e| PropagationError::Malformed(format!("{}: {}", what, e)))
}
