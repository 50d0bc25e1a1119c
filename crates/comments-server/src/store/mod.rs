//! Record store: the flat, parent-referencing comment table.

mod sqlite;

use async_trait::async_trait;
use comments_shared::{Comment, SortField, SortOrder};

pub use sqlite::SqliteStore;

/// A comment that passed validation and is ready to be inserted.
/// The store assigns `id` and `date`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewComment {
    pub user_name: String,
    pub email: String,
    pub home_page: Option<String>,
    pub text: String,
    pub parent_comment_id: Option<i64>,
    pub attachment: Option<String>,
}

#[async_trait]
pub trait CommentStore: Send + Sync {
    /// Inserts a single row atomically and returns it as stored.
    async fn insert(&self, comment: NewComment) -> Result<Comment, sqlx::Error>;

    async fn get(&self, id: i64) -> Result<Option<Comment>, sqlx::Error>;

    /// Direct replies of `parent_id`, ascending by id.
    async fn children(&self, parent_id: i64) -> Result<Vec<Comment>, sqlx::Error>;

    /// Comments without a parent, ordered by `field`/`order`, ties by ascending id.
    async fn top_level(
        &self,
        field: SortField,
        order: SortOrder,
    ) -> Result<Vec<Comment>, sqlx::Error>;
}
