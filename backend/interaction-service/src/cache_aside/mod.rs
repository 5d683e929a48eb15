//! Cache-aside repository machinery shared by all interaction domains

mod error;
mod repository;
mod store;
pub mod task_pool;

pub use error::{RepositoryError, RepositoryResult};
pub use repository::CacheAsideRepository;
pub use store::{ChildRecord, ChildStore, StoreError, StoreResult, WriteOp};
pub use task_pool::TaskPool;
