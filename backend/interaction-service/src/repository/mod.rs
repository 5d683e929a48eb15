pub mod comments;
pub mod favorites;
pub mod follows;

pub use comments::CommentStore;
pub use favorites::FavoriteStore;
pub use follows::FollowStore;

use collection_cache::ChildKey;

fn ids(children: &[ChildKey]) -> Vec<i64> {
    children.iter().map(|c| c.0).collect()
}
