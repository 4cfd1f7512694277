/// Engagement service - comments, likes and post deletion
///
/// Every operation that changes a child collection changes its counter in the
/// same aggregate transaction. The transaction holds the post lock from the
/// first read to commit, so concurrent requests against one post apply one at
/// a time, and a request that is dropped midway rolls back with its
/// transaction.
use crate::domain::{
    validation, AuthorSummary, Comment, CommentRemoved, CommentView, Counter, Like, LikeOutcome,
    Post, PostDeleted,
};
use crate::error::{AppError, Result};
use crate::metrics::{record_noop, record_outcome, COUNTER_DRIFT_TOTAL};
use crate::repository::{AggregateStore, AggregateTx};
use crate::services::media_cleanup::MediaCleanup;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct EngagementService {
    store: Arc<dyn AggregateStore>,
    cleanup: MediaCleanup,
}

impl EngagementService {
    pub fn new(store: Arc<dyn AggregateStore>, cleanup: MediaCleanup) -> Self {
        Self { store, cleanup }
    }

    /// Add a comment and bump `comment_count`
    pub async fn add_comment(
        &self,
        post_id: Uuid,
        author_id: Uuid,
        content: &str,
    ) -> Result<CommentView> {
        let result = self.add_comment_inner(post_id, author_id, content).await;
        record_outcome("add_comment", &result);
        result
    }

    async fn add_comment_inner(
        &self,
        post_id: Uuid,
        author_id: Uuid,
        content: &str,
    ) -> Result<CommentView> {
        let content = validation::comment_content(content)?;

        let mut tx = self.store.begin(post_id).await?;
        require_post(tx.as_mut()).await?;

        let comment = Comment::new(post_id, author_id, content);
        tx.insert_comment(&comment).await?;
        let comment_count = tx
            .adjust_counter(Counter::Comments, 1)
            .await?
            .ok_or_else(AppError::post_not_found)?;
        tx.commit().await?;

        debug!(post_id = %post_id, comment_id = %comment.id, comment_count, "comment added");

        let author = self.resolve_author(author_id).await;
        Ok(CommentView::new(comment, author))
    }

    /// Remove the requester's own comment and decrement `comment_count`
    pub async fn remove_comment(
        &self,
        post_id: Uuid,
        comment_id: Uuid,
        requester_id: Uuid,
    ) -> Result<CommentRemoved> {
        let result = self
            .remove_comment_inner(post_id, comment_id, requester_id)
            .await;
        record_outcome("remove_comment", &result);
        result
    }

    async fn remove_comment_inner(
        &self,
        post_id: Uuid,
        comment_id: Uuid,
        requester_id: Uuid,
    ) -> Result<CommentRemoved> {
        let mut tx = self.store.begin(post_id).await?;

        let comment = tx
            .find_comment(comment_id)
            .await?
            .ok_or_else(AppError::comment_not_found)?;
        if comment.author_id != requester_id {
            return Err(AppError::Forbidden(
                "only the author can delete this comment".to_string(),
            ));
        }

        let post = require_post(tx.as_mut()).await?;
        tx.delete_comment(comment_id).await?;
        let comment_count = decrement(tx.as_mut(), &post, Counter::Comments).await?;
        tx.commit().await?;

        debug!(post_id = %post_id, comment_id = %comment_id, comment_count, "comment removed");
        Ok(CommentRemoved {
            success: true,
            comment_count,
        })
    }

    /// Like the post if the user has not, otherwise unlike it
    pub async fn toggle_like(&self, post_id: Uuid, user_id: Uuid) -> Result<LikeOutcome> {
        let result = self.toggle_like_inner(post_id, user_id).await;
        match &result {
            Ok((_, false)) => record_noop("toggle_like"),
            _ => record_outcome("toggle_like", &result),
        }
        result.map(|(outcome, _)| outcome)
    }

    /// The flag is false when nothing was written
    async fn toggle_like_inner(
        &self,
        post_id: Uuid,
        user_id: Uuid,
    ) -> Result<(LikeOutcome, bool)> {
        let mut tx = self.store.begin(post_id).await?;
        let post = require_post(tx.as_mut()).await?;

        let (outcome, applied) = match tx.find_like(user_id).await? {
            Some(like) => {
                tx.delete_like(like.id).await?;
                let outcome = LikeOutcome {
                    liked: false,
                    like_count: decrement(tx.as_mut(), &post, Counter::Likes).await?,
                };
                (outcome, true)
            }
            None => {
                if tx.insert_like(&Like::new(post_id, user_id)).await? {
                    let like_count = tx
                        .adjust_counter(Counter::Likes, 1)
                        .await?
                        .ok_or_else(AppError::post_not_found)?;
                    let outcome = LikeOutcome {
                        liked: true,
                        like_count,
                    };
                    (outcome, true)
                } else {
                    // A concurrent like for the same pair won; nothing to apply
                    debug!(post_id = %post_id, user_id = %user_id, "like already present");
                    let outcome = LikeOutcome {
                        liked: true,
                        like_count: post.like_count,
                    };
                    (outcome, false)
                }
            }
        };
        tx.commit().await?;

        debug!(
            post_id = %post_id,
            user_id = %user_id,
            liked = outcome.liked,
            like_count = outcome.like_count,
            "like toggled"
        );
        Ok((outcome, applied))
    }

    /// Delete a post with all comments and likes, then its media
    pub async fn delete_post(&self, post_id: Uuid, requester_id: Uuid) -> Result<PostDeleted> {
        let result = self.delete_post_inner(post_id, requester_id).await;
        record_outcome("delete_post", &result);
        result
    }

    async fn delete_post_inner(&self, post_id: Uuid, requester_id: Uuid) -> Result<PostDeleted> {
        let mut tx = self.store.begin(post_id).await?;
        let post = require_post(tx.as_mut()).await?;
        if post.author_id != requester_id {
            return Err(AppError::Forbidden(
                "only the author can delete this post".to_string(),
            ));
        }

        let (comments_removed, likes_removed) = tx.delete_children().await?;
        if !tx.delete_post().await? {
            return Err(AppError::post_not_found());
        }
        tx.commit().await?;

        info!(
            post_id = %post_id,
            comments_removed,
            likes_removed,
            "post deleted"
        );

        // Committed; media removal can no longer affect the outcome
        self.cleanup
            .remove_all(post_id, &post.media_references())
            .await;

        Ok(PostDeleted {
            success: true,
            comments_removed,
            likes_removed,
        })
    }

    /// Recount children and overwrite both counters
    pub async fn reconcile_counters(&self, post_id: Uuid) -> Result<Post> {
        let result = self.reconcile_counters_inner(post_id).await;
        record_outcome("reconcile_counters", &result);
        result
    }

    async fn reconcile_counters_inner(&self, post_id: Uuid) -> Result<Post> {
        let mut tx = self.store.begin(post_id).await?;
        let mut post = require_post(tx.as_mut()).await?;

        for counter in [Counter::Comments, Counter::Likes] {
            let actual = tx.count_children(counter).await?;
            let stored = post.counter(counter);
            if actual != stored {
                COUNTER_DRIFT_TOTAL
                    .with_label_values(&[counter.column()])
                    .inc();
                warn!(
                    post_id = %post_id,
                    counter = counter.column(),
                    stored,
                    actual,
                    "counter drift repaired"
                );
                tx.set_counter(counter, actual).await?;
                post.set_counter(counter, actual);
            }
        }
        tx.commit().await?;

        Ok(post)
    }

    async fn resolve_author(&self, author_id: Uuid) -> AuthorSummary {
        match self.store.find_authors(&[author_id]).await {
            Ok(mut authors) => authors
                .remove(&author_id)
                .unwrap_or_else(|| AuthorSummary::unknown(author_id)),
            Err(e) => {
                // The comment is committed; a profile lookup failure only degrades the view
                warn!(author_id = %author_id, error = %e, "author lookup failed");
                AuthorSummary::unknown(author_id)
            }
        }
    }
}

async fn require_post(tx: &mut dyn AggregateTx) -> Result<Post> {
    tx.post().await?.ok_or_else(AppError::post_not_found)
}

/// Decrement a counter whose child record was just deleted.
///
/// A locked value of zero means the counter had already drifted below the
/// real count; it is re-derived from the children instead.
async fn decrement(tx: &mut dyn AggregateTx, post: &Post, counter: Counter) -> Result<i64> {
    if post.counter(counter) <= 0 {
        let actual = tx.count_children(counter).await?;
        COUNTER_DRIFT_TOTAL
            .with_label_values(&[counter.column()])
            .inc();
        warn!(
            post_id = %post.id,
            counter = counter.column(),
            actual,
            "counter already zero on delete, re-deriving"
        );
        tx.set_counter(counter, actual).await?;
        return Ok(actual);
    }

    tx.adjust_counter(counter, -1)
        .await?
        .ok_or_else(AppError::post_not_found)
}
