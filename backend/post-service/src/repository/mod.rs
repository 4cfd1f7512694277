/// Storage for the post aggregate
///
/// An aggregate is a post together with its comments and likes. Reads and
/// single-record writes go through [`AggregateStore`]; anything that touches a
/// counter runs inside an [`AggregateTx`] opened with
/// [`AggregateStore::begin`], which holds an exclusive lock on one post until
/// it is committed, rolled back or dropped. Dropping an uncommitted
/// transaction rolls it back.
use crate::domain::{AuthorSummary, Comment, Counter, Like, Pagination, Post};
use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgAggregateStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("transaction aborted: {0}")]
    TransactionAborted(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            // constraint violations, serialization failures and deadlocks
            sqlx::Error::Database(_) => StoreError::TransactionAborted(err.to_string()),
            sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::Decode(_)
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::TypeNotFound { .. } => StoreError::Corrupt(err.to_string()),
            _ => StoreError::Unavailable(err.to_string()),
        }
    }
}

#[async_trait]
pub trait AggregateStore: Send + Sync {
    /// Open a transaction scoped to one post, waiting for its lock.
    /// The post may not exist; check [`AggregateTx::post`].
    async fn begin(&self, post_id: Uuid) -> StoreResult<Box<dyn AggregateTx>>;

    async fn insert_post(&self, post: &Post) -> StoreResult<()>;

    async fn find_post(&self, post_id: Uuid) -> StoreResult<Option<Post>>;

    /// Set the caption of a post owned by `author_id`.
    /// Returns None when no such post belongs to the author.
    async fn update_caption(
        &self,
        post_id: Uuid,
        author_id: Uuid,
        caption: Option<&str>,
    ) -> StoreResult<Option<Post>>;

    async fn find_comment(&self, comment_id: Uuid) -> StoreResult<Option<Comment>>;

    async fn find_like(&self, like_id: Uuid) -> StoreResult<Option<Like>>;

    async fn has_liked(&self, post_id: Uuid, user_id: Uuid) -> StoreResult<bool>;

    /// Count the child records behind `counter` outside any transaction
    async fn count_children(&self, post_id: Uuid, counter: Counter) -> StoreResult<i64>;

    /// Newest first, with the total number of comments on the post
    async fn list_comments(
        &self,
        post_id: Uuid,
        page: Pagination,
    ) -> StoreResult<(Vec<Comment>, i64)>;

    /// Newest first, with the total number of posts by the author
    async fn list_posts_by_author(
        &self,
        author_id: Uuid,
        page: Pagination,
    ) -> StoreResult<(Vec<Post>, i64)>;

    /// Public profile fields for the given users; unknown ids are omitted
    async fn find_authors(&self, ids: &[Uuid]) -> StoreResult<HashMap<Uuid, AuthorSummary>>;

    async fn ping(&self) -> StoreResult<()>;
}

/// A transaction holding the lock on one post aggregate
#[async_trait]
pub trait AggregateTx: Send {
    fn post_id(&self) -> Uuid;

    /// The locked post, None if it does not exist
    async fn post(&mut self) -> StoreResult<Option<Post>>;

    async fn insert_comment(&mut self, comment: &Comment) -> StoreResult<()>;

    /// Comment with this id belonging to the locked post
    async fn find_comment(&mut self, comment_id: Uuid) -> StoreResult<Option<Comment>>;

    async fn delete_comment(&mut self, comment_id: Uuid) -> StoreResult<bool>;

    async fn find_like(&mut self, user_id: Uuid) -> StoreResult<Option<Like>>;

    /// Returns false when a like for the same (user, post) already exists
    async fn insert_like(&mut self, like: &Like) -> StoreResult<bool>;

    async fn delete_like(&mut self, like_id: Uuid) -> StoreResult<bool>;

    /// Add `delta` to the counter, never going below zero.
    /// Returns the new value, or None if the post row is gone.
    async fn adjust_counter(&mut self, counter: Counter, delta: i64) -> StoreResult<Option<i64>>;

    async fn count_children(&mut self, counter: Counter) -> StoreResult<i64>;

    async fn set_counter(&mut self, counter: Counter, value: i64) -> StoreResult<()>;

    /// Remove every comment and like of the post, returning (comments, likes)
    async fn delete_children(&mut self) -> StoreResult<(u64, u64)>;

    async fn delete_post(&mut self) -> StoreResult<bool>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}
