//! Relational store seam of the cache-aside repository

use chrono::{DateTime, Utc};
use collection_cache::{ChildKey, ParentKey};
use counter_propagation::DeltaEvent;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashSet;
use thiserror::Error;

/// Kind of mutation that produced a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    Create,
    Delete,
}

/// A record cached as one field of its parent's collection.
pub trait ChildRecord: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    fn parent_key(&self) -> ParentKey;

    fn child_key(&self) -> ChildKey;

    /// Listing order is newest first.
    fn created_at(&self) -> DateTime<Utc>;

    /// Counter deltas owed by other services after `op` committed.
    fn counter_deltas(&self, op: WriteOp) -> Vec<DeltaEvent>;
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("Transaction failed: {0}")]
    Transaction(#[source] sqlx::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Serialization failure and deadlock detected
const TRANSACTION_ABORT_CODES: [&str; 2] = ["40001", "40P01"];

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        let aborted = err
            .as_database_error()
            .and_then(|db| db.code())
            .map(|code| TRANSACTION_ABORT_CODES.iter().any(|abort| *abort == code))
            .unwrap_or(false);

        if aborted {
            StoreError::Transaction(err)
        } else {
            StoreError::Database(err)
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Source of truth for one domain's child records.
#[async_trait::async_trait]
pub trait ChildStore: Send + Sync + 'static {
    type Record: ChildRecord;
    type Draft: Send + Sync + 'static;

    /// Every child of `parent`.
    async fn list_children(&self, parent: ParentKey) -> StoreResult<Vec<Self::Record>>;

    async fn find_child(
        &self,
        parent: ParentKey,
        child: ChildKey,
    ) -> StoreResult<Option<Self::Record>>;

    /// Subset of `children` that exist under `parent`, in one query.
    async fn find_members(
        &self,
        parent: ParentKey,
        children: &[ChildKey],
    ) -> StoreResult<HashSet<ChildKey>>;

    /// Insert a child. `None` when it already existed (no-op).
    async fn insert_child(&self, draft: Self::Draft) -> StoreResult<Option<Self::Record>>;

    /// Delete a child, returning the removed row. `None` when it was absent.
    async fn delete_child(
        &self,
        parent: ParentKey,
        child: ChildKey,
    ) -> StoreResult<Option<Self::Record>>;
}
