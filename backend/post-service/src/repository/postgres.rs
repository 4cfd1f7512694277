/// PostgreSQL aggregate store
///
/// A transaction locks the post row with `SELECT ... FOR UPDATE` as soon as it
/// begins, so every counter change on one post is serialized while other posts
/// proceed independently. Counters are only ever changed with a single
/// `UPDATE ... RETURNING` add-delta.
use super::{AggregateStore, AggregateTx, StoreError, StoreResult};
use crate::domain::{AuthorSummary, Comment, Counter, Like, MediaKind, Pagination, Post};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

const SERVICE: &str = "post-service";

const POST_COLUMNS: &str = "id, author_id, caption, media_url, media_urls, media_kind, \
                            like_count, comment_count, created_at";

/// Raw `posts` row, validated into a [`Post`] before it leaves the store
#[derive(Debug, sqlx::FromRow)]
struct PostRow {
    id: Uuid,
    author_id: Uuid,
    caption: Option<String>,
    media_url: String,
    media_urls: Vec<String>,
    media_kind: String,
    like_count: i64,
    comment_count: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<PostRow> for Post {
    type Error = StoreError;

    fn try_from(row: PostRow) -> Result<Self, Self::Error> {
        let media_kind: MediaKind = row
            .media_kind
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("post {}: {}", row.id, e)))?;

        if row.like_count < 0 || row.comment_count < 0 {
            return Err(StoreError::Corrupt(format!(
                "post {} has negative counters ({}, {})",
                row.id, row.like_count, row.comment_count
            )));
        }

        Ok(Post {
            id: row.id,
            author_id: row.author_id,
            caption: row.caption,
            media_url: row.media_url,
            media_urls: row.media_urls,
            media_kind,
            like_count: row.like_count,
            comment_count: row.comment_count,
            created_at: row.created_at,
        })
    }
}

fn into_posts(rows: Vec<PostRow>) -> StoreResult<Vec<Post>> {
    rows.into_iter().map(Post::try_from).collect()
}

#[derive(Clone)]
pub struct PgAggregateStore {
    pool: PgPool,
}

impl PgAggregateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl AggregateStore for PgAggregateStore {
    async fn begin(&self, post_id: Uuid) -> StoreResult<Box<dyn AggregateTx>> {
        let mut tx = db_pool::begin_with_metrics(&self.pool, SERVICE).await?;

        // Row lock held until commit/rollback; a missing post locks nothing
        let locked: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM posts WHERE id = $1 FOR UPDATE")
                .bind(post_id)
                .fetch_optional(&mut *tx)
                .await?;

        debug!(post_id = %post_id, exists = locked.is_some(), "aggregate transaction opened");
        Ok(Box::new(PgAggregateTx { tx, post_id }))
    }

    async fn insert_post(&self, post: &Post) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO posts (id, author_id, caption, media_url, media_urls, media_kind,
                               like_count, comment_count, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(post.id)
        .bind(post.author_id)
        .bind(&post.caption)
        .bind(&post.media_url)
        .bind(&post.media_urls)
        .bind(post.media_kind.as_str())
        .bind(post.like_count)
        .bind(post.comment_count)
        .bind(post.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_post(&self, post_id: Uuid) -> StoreResult<Option<Post>> {
        let row = sqlx::query_as::<_, PostRow>(&format!(
            "SELECT {} FROM posts WHERE id = $1",
            POST_COLUMNS
        ))
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Post::try_from).transpose()
    }

    async fn update_caption(
        &self,
        post_id: Uuid,
        author_id: Uuid,
        caption: Option<&str>,
    ) -> StoreResult<Option<Post>> {
        let row = sqlx::query_as::<_, PostRow>(&format!(
            "UPDATE posts SET caption = $3 WHERE id = $1 AND author_id = $2 RETURNING {}",
            POST_COLUMNS
        ))
        .bind(post_id)
        .bind(author_id)
        .bind(caption)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Post::try_from).transpose()
    }

    async fn find_comment(&self, comment_id: Uuid) -> StoreResult<Option<Comment>> {
        let comment = sqlx::query_as::<_, Comment>(
            "SELECT id, post_id, author_id, content, created_at FROM comments WHERE id = $1",
        )
        .bind(comment_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(comment)
    }

    async fn find_like(&self, like_id: Uuid) -> StoreResult<Option<Like>> {
        let like = sqlx::query_as::<_, Like>(
            "SELECT id, post_id, user_id, created_at FROM likes WHERE id = $1",
        )
        .bind(like_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(like)
    }

    async fn has_liked(&self, post_id: Uuid, user_id: Uuid) -> StoreResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM likes WHERE post_id = $1 AND user_id = $2)",
        )
        .bind(post_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn count_children(&self, post_id: Uuid, counter: Counter) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {} WHERE post_id = $1",
            counter.child_table()
        ))
        .bind(post_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn list_comments(
        &self,
        post_id: Uuid,
        page: Pagination,
    ) -> StoreResult<(Vec<Comment>, i64)> {
        let comments = sqlx::query_as::<_, Comment>(
            r#"
            SELECT id, post_id, author_id, content, created_at
            FROM comments
            WHERE post_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(post_id)
        .bind(i64::from(page.limit))
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        let total = self.count_children(post_id, Counter::Comments).await?;
        Ok((comments, total))
    }

    async fn list_posts_by_author(
        &self,
        author_id: Uuid,
        page: Pagination,
    ) -> StoreResult<(Vec<Post>, i64)> {
        let rows = sqlx::query_as::<_, PostRow>(&format!(
            "SELECT {} FROM posts WHERE author_id = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3",
            POST_COLUMNS
        ))
        .bind(author_id)
        .bind(i64::from(page.limit))
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts WHERE author_id = $1")
            .bind(author_id)
            .fetch_one(&self.pool)
            .await?;

        Ok((into_posts(rows)?, total))
    }

    async fn find_authors(&self, ids: &[Uuid]) -> StoreResult<HashMap<Uuid, AuthorSummary>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let authors = sqlx::query_as::<_, AuthorSummary>(
            "SELECT id, username, avatar FROM users WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(authors.into_iter().map(|a| (a.id, a)).collect())
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

pub struct PgAggregateTx {
    tx: Transaction<'static, Postgres>,
    post_id: Uuid,
}

#[async_trait]
impl AggregateTx for PgAggregateTx {
    fn post_id(&self) -> Uuid {
        self.post_id
    }

    async fn post(&mut self) -> StoreResult<Option<Post>> {
        let row = sqlx::query_as::<_, PostRow>(&format!(
            "SELECT {} FROM posts WHERE id = $1",
            POST_COLUMNS
        ))
        .bind(self.post_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(Post::try_from).transpose()
    }

    async fn insert_comment(&mut self, comment: &Comment) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO comments (id, post_id, author_id, content, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(comment.id)
        .bind(self.post_id)
        .bind(comment.author_id)
        .bind(&comment.content)
        .bind(comment.created_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn find_comment(&mut self, comment_id: Uuid) -> StoreResult<Option<Comment>> {
        let comment = sqlx::query_as::<_, Comment>(
            r#"
            SELECT id, post_id, author_id, content, created_at
            FROM comments
            WHERE id = $1 AND post_id = $2
            "#,
        )
        .bind(comment_id)
        .bind(self.post_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(comment)
    }

    async fn delete_comment(&mut self, comment_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM comments WHERE id = $1 AND post_id = $2")
            .bind(comment_id)
            .bind(self.post_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_like(&mut self, user_id: Uuid) -> StoreResult<Option<Like>> {
        let like = sqlx::query_as::<_, Like>(
            "SELECT id, post_id, user_id, created_at FROM likes WHERE post_id = $1 AND user_id = $2",
        )
        .bind(self.post_id)
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(like)
    }

    async fn insert_like(&mut self, like: &Like) -> StoreResult<bool> {
        let inserted: Option<Uuid> = sqlx::query_scalar(
            r#"
            INSERT INTO likes (id, post_id, user_id, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, post_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(like.id)
        .bind(self.post_id)
        .bind(like.user_id)
        .bind(like.created_at)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(inserted.is_some())
    }

    async fn delete_like(&mut self, like_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM likes WHERE id = $1 AND post_id = $2")
            .bind(like_id)
            .bind(self.post_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn adjust_counter(&mut self, counter: Counter, delta: i64) -> StoreResult<Option<i64>> {
        let column = counter.column();
        let value: Option<i64> = sqlx::query_scalar(&format!(
            "UPDATE posts SET {col} = GREATEST({col} + $2, 0) WHERE id = $1 RETURNING {col}",
            col = column
        ))
        .bind(self.post_id)
        .bind(delta)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(value)
    }

    async fn count_children(&mut self, counter: Counter) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {} WHERE post_id = $1",
            counter.child_table()
        ))
        .bind(self.post_id)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(count)
    }

    async fn set_counter(&mut self, counter: Counter, value: i64) -> StoreResult<()> {
        sqlx::query(&format!(
            "UPDATE posts SET {} = $2 WHERE id = $1",
            counter.column()
        ))
        .bind(self.post_id)
        .bind(value.max(0))
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn delete_children(&mut self) -> StoreResult<(u64, u64)> {
        let comments = sqlx::query("DELETE FROM comments WHERE post_id = $1")
            .bind(self.post_id)
            .execute(&mut *self.tx)
            .await?
            .rows_affected();

        let likes = sqlx::query("DELETE FROM likes WHERE post_id = $1")
            .bind(self.post_id)
            .execute(&mut *self.tx)
            .await?
            .rows_affected();

        Ok((comments, likes))
    }

    async fn delete_post(&mut self) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(self.post_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| StoreError::TransactionAborted(e.to_string()))
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(kind: &str, likes: i64) -> PostRow {
        PostRow {
            id: Uuid::new_v4(),
            author_id: Uuid::new_v4(),
            caption: None,
            media_url: "https://cdn.example.com/a.jpg".into(),
            media_urls: vec![],
            media_kind: kind.into(),
            like_count: likes,
            comment_count: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_valid_row_converts() {
        let post = Post::try_from(row("video", 3)).unwrap();
        assert_eq!(post.media_kind, MediaKind::Video);
        assert_eq!(post.like_count, 3);
    }

    #[test]
    fn test_unknown_media_kind_is_corrupt() {
        assert!(matches!(
            Post::try_from(row("carousel", 0)),
            Err(StoreError::Corrupt(_))
        ));
    }

    #[test]
    fn test_negative_counter_is_corrupt() {
        assert!(matches!(
            Post::try_from(row("image", -1)),
            Err(StoreError::Corrupt(_))
        ));
    }
}
