pub mod comments;
pub mod counters;
pub mod favorites;
pub mod follows;

pub use comments::CommentService;
pub use counters::{run_ledger_cleanup, PgCounterSink};
pub use favorites::FavoriteService;
pub use follows::FollowService;

use crate::cache_aside::RepositoryError;

fn require_id(name: &str, id: i64) -> Result<(), RepositoryError> {
    if id <= 0 {
        return Err(RepositoryError::InvalidArgument(format!(
            "{} must be positive, got {}",
            name, id
        )));
    }
    Ok(())
}
