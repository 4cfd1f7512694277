use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Kind of media attached to a post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Multiple,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Multiple => "multiple",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(MediaKind::Image),
            "video" => Ok(MediaKind::Video),
            "multiple" => Ok(MediaKind::Multiple),
            other => Err(format!("unknown media kind '{}'", other)),
        }
    }
}

/// The denormalized counters kept on a post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    Likes,
    Comments,
}

impl Counter {
    /// Column backing this counter on the `posts` table
    pub fn column(&self) -> &'static str {
        match self {
            Counter::Likes => "like_count",
            Counter::Comments => "comment_count",
        }
    }

    /// Table holding the child records this counter summarizes
    pub fn child_table(&self) -> &'static str {
        match self {
            Counter::Likes => "likes",
            Counter::Comments => "comments",
        }
    }
}

/// Post entity - owned by its author; counters are derived from children
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Uuid,
    pub author_id: Uuid,
    pub caption: Option<String>,
    pub media_url: String,
    pub media_urls: Vec<String>,
    pub media_kind: MediaKind,
    pub like_count: i64,
    pub comment_count: i64,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied when creating a post
#[derive(Debug, Clone)]
pub struct NewPost {
    pub author_id: Uuid,
    pub caption: Option<String>,
    pub media_url: String,
    pub media_urls: Vec<String>,
    pub media_kind: MediaKind,
}

impl Post {
    pub fn new(draft: NewPost) -> Self {
        Self::with_id(Uuid::new_v4(), draft)
    }

    pub fn with_id(id: Uuid, draft: NewPost) -> Self {
        Self {
            id,
            author_id: draft.author_id,
            caption: draft.caption,
            media_url: draft.media_url,
            media_urls: draft.media_urls,
            media_kind: draft.media_kind,
            like_count: 0,
            comment_count: 0,
            created_at: Utc::now(),
        }
    }

    pub fn counter(&self, counter: Counter) -> i64 {
        match counter {
            Counter::Likes => self.like_count,
            Counter::Comments => self.comment_count,
        }
    }

    pub fn set_counter(&mut self, counter: Counter, value: i64) {
        match counter {
            Counter::Likes => self.like_count = value,
            Counter::Comments => self.comment_count = value,
        }
    }

    /// Primary media URL followed by the media list, duplicates and blanks removed
    pub fn media_references(&self) -> Vec<String> {
        let mut refs: Vec<String> = Vec::with_capacity(self.media_urls.len() + 1);
        for url in std::iter::once(&self.media_url).chain(self.media_urls.iter()) {
            if !url.is_empty() && !refs.contains(url) {
                refs.push(url.clone());
            }
        }
        refs
    }
}

/// Comment entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: Uuid,
    pub post_id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub fn new(post_id: Uuid, author_id: Uuid, content: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            post_id,
            author_id,
            content,
            created_at: Utc::now(),
        }
    }
}

/// Like entity - at most one per (user_id, post_id)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Like {
    pub id: Uuid,
    pub post_id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Like {
    pub fn new(post_id: Uuid, user_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            post_id,
            user_id,
            created_at: Utc::now(),
        }
    }
}

/// Public display fields of a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AuthorSummary {
    pub id: Uuid,
    pub username: Option<String>,
    pub avatar: Option<String>,
}

impl AuthorSummary {
    /// Placeholder for a user with no profile row
    pub fn unknown(id: Uuid) -> Self {
        Self {
            id,
            username: None,
            avatar: None,
        }
    }
}

/// Comment as returned to clients, with its author resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub id: Uuid,
    pub post_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub author: AuthorSummary,
}

impl CommentView {
    pub fn new(comment: Comment, author: AuthorSummary) -> Self {
        Self {
            id: comment.id,
            post_id: comment.post_id,
            content: comment.content,
            created_at: comment.created_at,
            author,
        }
    }
}

/// Result of a like toggle, counter read inside the committing transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeOutcome {
    pub liked: bool,
    pub like_count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeStatus {
    pub liked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentRemoved {
    pub success: bool,
    pub comment_count: i64,
}

/// What a committed post deletion removed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostDeleted {
    pub success: bool,
    pub comments_removed: u64,
    pub likes_removed: u64,
}

/// Page/limit request, clamped to sane bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Pagination {
    pub const MAX_LIMIT: u32 = 50;

    pub fn new(page: Option<u32>, limit: Option<u32>, default_limit: u32) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(default_limit).clamp(1, Self::MAX_LIMIT),
        }
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.limit)
    }
}

/// A page of results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
    pub pages: i64,
    pub has_more: bool,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, pagination: Pagination) -> Self {
        let limit = i64::from(pagination.limit);
        let has_more = pagination.offset() + (items.len() as i64) < total;
        Self {
            pages: (total + limit - 1) / limit,
            has_more,
            items,
            total,
            page: pagination.page,
            limit: pagination.limit,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            limit: self.limit,
            pages: self.pages,
            has_more: self.has_more,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post_with_media(primary: &str, list: &[&str]) -> Post {
        Post::new(NewPost {
            author_id: Uuid::new_v4(),
            caption: None,
            media_url: primary.to_string(),
            media_urls: list.iter().map(|s| s.to_string()).collect(),
            media_kind: MediaKind::Multiple,
        })
    }

    #[test]
    fn test_new_post_starts_with_zero_counters() {
        let post = post_with_media("a", &[]);
        assert_eq!(post.like_count, 0);
        assert_eq!(post.comment_count, 0);
    }

    #[test]
    fn test_media_references_dedupes_primary() {
        let post = post_with_media("a", &["a", "b", "", "b", "c"]);
        assert_eq!(post.media_references(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_media_kind_parse() {
        assert_eq!("video".parse::<MediaKind>(), Ok(MediaKind::Video));
        assert!("gif".parse::<MediaKind>().is_err());
    }

    #[test]
    fn test_pagination_clamps() {
        let p = Pagination::new(Some(0), Some(500), 10);
        assert_eq!(p.page, 1);
        assert_eq!(p.limit, Pagination::MAX_LIMIT);

        let p = Pagination::new(None, Some(0), 10);
        assert_eq!(p.limit, 1);
        assert_eq!(Pagination::new(Some(3), None, 9).offset(), 18);
    }

    #[test]
    fn test_page_math() {
        let p = Pagination::new(Some(1), Some(10), 10);
        let page = Page::new(vec![1; 10], 21, p);
        assert_eq!(page.pages, 3);
        assert!(page.has_more);

        let last = Page::new(vec![1], 21, Pagination::new(Some(3), Some(10), 10));
        assert!(!last.has_more);

        let empty: Page<i32> = Page::new(vec![], 0, p);
        assert_eq!(empty.pages, 0);
        assert!(!empty.has_more);
    }

    #[test]
    fn test_post_serializes_camel_case() {
        let post = post_with_media("a", &[]);
        let json = serde_json::to_value(&post).unwrap();
        assert_eq!(json["likeCount"], 0);
        assert_eq!(json["mediaKind"], "multiple");
        assert!(json.get("authorId").is_some());
    }
}
