/// Post service - creation, lookup, captions and listings
use crate::domain::{
    validation, AuthorSummary, CommentView, LikeStatus, MediaKind, NewPost, Page, Pagination, Post,
};
use crate::error::{AppError, Result};
use crate::repository::AggregateStore;
use crate::services::media_cleanup::MediaCleanup;
use media_store::{BlobStore, MediaError, MediaUpload};
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

pub const DEFAULT_POSTS_PER_PAGE: u32 = 9;
pub const DEFAULT_COMMENTS_PER_PAGE: u32 = 10;

#[derive(Clone)]
pub struct PostService {
    store: Arc<dyn AggregateStore>,
    blobs: Arc<dyn BlobStore>,
    cleanup: MediaCleanup,
    max_upload_bytes: usize,
}

impl PostService {
    pub fn new(
        store: Arc<dyn AggregateStore>,
        blobs: Arc<dyn BlobStore>,
        cleanup: MediaCleanup,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            store,
            blobs,
            cleanup,
            max_upload_bytes,
        }
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    /// Upload the media files and insert the post with zero counters
    pub async fn create_post(
        &self,
        author_id: Uuid,
        caption: Option<&str>,
        uploads: Vec<MediaUpload>,
    ) -> Result<Post> {
        let caption = validation::caption(caption)?;
        if uploads.is_empty() {
            return Err(AppError::InvalidInput(
                "at least one media file is required".to_string(),
            ));
        }
        for upload in &uploads {
            if upload.bytes.len() > self.max_upload_bytes {
                return Err(MediaError::TooLarge {
                    size: upload.bytes.len(),
                    limit: self.max_upload_bytes,
                }
                .into());
            }
        }

        let post_id = Uuid::new_v4();
        let media_kind = match uploads.as_slice() {
            [single] if single.is_video() => MediaKind::Video,
            [_] => MediaKind::Image,
            _ => MediaKind::Multiple,
        };

        let mut urls = Vec::with_capacity(uploads.len());
        for upload in uploads {
            match self.blobs.store(author_id, upload).await {
                Ok(url) => urls.push(url),
                Err(e) => {
                    self.cleanup.remove_all(post_id, &urls).await;
                    return Err(e.into());
                }
            }
        }

        let media_url = urls
            .first()
            .cloned()
            .ok_or_else(|| AppError::Internal("no media stored".to_string()))?;
        let media_urls = if media_kind == MediaKind::Multiple {
            urls.clone()
        } else {
            Vec::new()
        };

        let post = Post::with_id(
            post_id,
            NewPost {
                author_id,
                caption,
                media_url,
                media_urls,
                media_kind,
            },
        );

        if let Err(e) = self.store.insert_post(&post).await {
            error!(post_id = %post_id, error = %e, "post insert failed, removing uploaded media");
            self.cleanup.remove_all(post_id, &urls).await;
            return Err(e.into());
        }

        info!(post_id = %post.id, author_id = %author_id, kind = %post.media_kind, "post created");
        Ok(post)
    }

    pub async fn get_post(&self, post_id: Uuid) -> Result<Post> {
        self.store
            .find_post(post_id)
            .await?
            .ok_or_else(AppError::post_not_found)
    }

    /// Change the caption of the requester's own post
    pub async fn update_caption(
        &self,
        post_id: Uuid,
        requester_id: Uuid,
        caption: Option<&str>,
    ) -> Result<Post> {
        let caption = validation::caption(caption)?;

        if let Some(post) = self
            .store
            .update_caption(post_id, requester_id, caption.as_deref())
            .await?
        {
            debug!(post_id = %post_id, "caption updated");
            return Ok(post);
        }

        // Nothing updated: tell a missing post apart from someone else's
        match self.store.find_post(post_id).await? {
            Some(_) => Err(AppError::Forbidden(
                "only the author can edit this post".to_string(),
            )),
            None => Err(AppError::post_not_found()),
        }
    }

    pub async fn list_user_posts(
        &self,
        author_id: Uuid,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> Result<Page<Post>> {
        let pagination = Pagination::new(page, limit, DEFAULT_POSTS_PER_PAGE);
        let (posts, total) = self
            .store
            .list_posts_by_author(author_id, pagination)
            .await?;
        Ok(Page::new(posts, total, pagination))
    }

    /// Newest comments first, authors resolved in one lookup
    pub async fn list_comments(
        &self,
        post_id: Uuid,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> Result<Page<CommentView>> {
        let pagination = Pagination::new(page, limit, DEFAULT_COMMENTS_PER_PAGE);
        let (comments, total) = self.store.list_comments(post_id, pagination).await?;

        let mut author_ids: Vec<Uuid> = comments.iter().map(|c| c.author_id).collect();
        author_ids.sort_unstable();
        author_ids.dedup();
        let authors = self.store.find_authors(&author_ids).await?;

        Ok(Page::new(comments, total, pagination).map(|comment| {
            let author = authors
                .get(&comment.author_id)
                .cloned()
                .unwrap_or_else(|| AuthorSummary::unknown(comment.author_id));
            CommentView::new(comment, author)
        }))
    }

    pub async fn like_status(&self, post_id: Uuid, user_id: Uuid) -> Result<LikeStatus> {
        let liked = self.store.has_liked(post_id, user_id).await?;
        Ok(LikeStatus { liked })
    }
}
