//! Typed collection key schema
//!
//! Callers address the cache with [`ParentKey`] / [`ChildKey`] only. The
//! string encoding below is private to the adapters.
//! Key format: v{VERSION}:{domain}:{parent_id}, field: {child_id}

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{CacheError, CacheResult};

/// Cache schema version - increment when changing key formats
pub const CACHE_VERSION: u32 = 1;

/// Reserved hash field marking a collection as materialized.
/// Valid ids are never negative, so this cannot collide with a child.
pub(crate) const SENTINEL_FIELD: &str = "-1";

/// Scoping identifier of a cached collection (video id, user id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParentKey(pub i64);

/// Member identifier within a parent's collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChildKey(pub i64);

/// Two-level address of a single cached child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub parent: ParentKey,
    pub child: ChildKey,
}

impl CacheKey {
    pub fn new(parent: ParentKey, child: ChildKey) -> Self {
        Self { parent, child }
    }
}

impl fmt::Display for ParentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ChildKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ParentKey {
    fn from(id: i64) -> Self {
        ParentKey(id)
    }
}

impl From<i64> for ChildKey {
    fn from(id: i64) -> Self {
        ChildKey(id)
    }
}

/// Per-domain key namespace ("comment", "favorite", "follow").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    domain: String,
}

impl KeySpace {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Redis key of a parent's collection.
    /// Format: v1:{domain}:{parent_id}
    pub(crate) fn collection_key(&self, parent: ParentKey) -> CacheResult<String> {
        if parent.0 < 0 {
            return Err(CacheError::InvalidKey(format!(
                "negative parent id {} in {}",
                parent.0, self.domain
            )));
        }
        Ok(format!("v{}:{}:{}", CACHE_VERSION, self.domain, parent.0))
    }
}

/// Hash field name of a child.
pub(crate) fn child_field(child: ChildKey) -> CacheResult<String> {
    if child.0 < 0 {
        return Err(CacheError::InvalidKey(format!(
            "negative child id {} would collide with the sentinel",
            child.0
        )));
    }
    Ok(child.0.to_string())
}

pub(crate) fn is_sentinel(field: &str) -> bool {
    field == SENTINEL_FIELD
}
