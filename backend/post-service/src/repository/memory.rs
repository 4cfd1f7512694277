/// In-process aggregate store
///
/// Each post has its own async mutex. A transaction holds it from `begin`
/// until it is committed or dropped, works on a private copy of the
/// aggregate, and publishes that copy in one step on commit. Readers outside a
/// transaction only ever see committed aggregates.
///
/// Outages and commit failures can be injected to exercise error paths.
use super::{AggregateStore, AggregateTx, StoreError, StoreResult};
use crate::domain::{AuthorSummary, Comment, Counter, Like, Pagination, Post};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    posts: HashMap<Uuid, Post>,
    // keyed by post id, then record id
    comments: HashMap<Uuid, HashMap<Uuid, Comment>>,
    likes: HashMap<Uuid, HashMap<Uuid, Like>>,
    authors: HashMap<Uuid, AuthorSummary>,
}

struct Inner {
    tables: RwLock<Tables>,
    post_locks: DashMap<Uuid, Arc<Mutex<()>>>,
    available: AtomicBool,
    fail_next_commit: AtomicBool,
    miss_next_like_lookup: AtomicBool,
}

impl Inner {
    fn ensure_available(&self) -> StoreResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store is offline".to_string()))
        }
    }

    async fn lock_post(self: &Arc<Self>, post_id: Uuid) -> PostLock {
        let lock = self.post_locks.entry(post_id).or_default().clone();
        PostLock {
            inner: self.clone(),
            post_id,
            guard: Some(lock.lock_owned().await),
        }
    }
}

/// Exclusive hold on one post; the map entry goes away with the last holder
struct PostLock {
    inner: Arc<Inner>,
    post_id: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for PostLock {
    fn drop(&mut self) {
        drop(self.guard.take());
        // a count of one means no other task holds or waits on this mutex
        self.inner
            .post_locks
            .remove_if(&self.post_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            inner: Arc::new(Inner {
                tables: RwLock::new(Tables::default()),
                post_locks: DashMap::new(),
                available: AtomicBool::new(true),
                fail_next_commit: AtomicBool::new(false),
                miss_next_like_lookup: AtomicBool::new(false),
            }),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the medium going away (or coming back)
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
    }

    /// Make the next commit fail with [`StoreError::TransactionAborted`]
    pub fn inject_commit_failure(&self) {
        self.inner.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Make the next in-transaction like lookup report no like, so the
    /// following insert runs into the existing `(user, post)` pair
    pub fn miss_next_like_lookup(&self) {
        self.inner.miss_next_like_lookup.store(true, Ordering::SeqCst);
    }

    pub async fn insert_author(&self, author: AuthorSummary) {
        self.inner.tables.write().await.authors.insert(author.id, author);
    }

    /// Overwrite a stored counter without touching children
    pub async fn force_counter(&self, post_id: Uuid, counter: Counter, value: i64) {
        let _guard = self.inner.lock_post(post_id).await;
        if let Some(post) = self.inner.tables.write().await.posts.get_mut(&post_id) {
            post.set_counter(counter, value);
        }
    }

    /// Comments and likes whose post no longer exists
    pub async fn orphan_count(&self) -> usize {
        let tables = self.inner.tables.read().await;
        orphans_of(&tables.comments, &tables.posts) + orphans_of(&tables.likes, &tables.posts)
    }
}

fn orphans_of<T>(by_post: &HashMap<Uuid, HashMap<Uuid, T>>, posts: &HashMap<Uuid, Post>) -> usize {
    by_post
        .iter()
        .filter(|(post_id, _)| !posts.contains_key(post_id))
        .map(|(_, records)| records.len())
        .sum()
}

fn paginate<T>(mut items: Vec<T>, page: Pagination) -> Vec<T> {
    let offset = page.offset() as usize;
    if offset >= items.len() {
        return Vec::new();
    }
    items.drain(..offset);
    items.truncate(page.limit as usize);
    items
}

#[async_trait]
impl AggregateStore for MemoryStore {
    async fn begin(&self, post_id: Uuid) -> StoreResult<Box<dyn AggregateTx>> {
        self.inner.ensure_available()?;
        let guard = self.inner.lock_post(post_id).await;

        let tables = self.inner.tables.read().await;
        let post = tables.posts.get(&post_id).cloned();
        let tx = MemoryTx {
            inner: self.inner.clone(),
            post_id,
            existed: post.is_some(),
            post,
            comments: tables.comments.get(&post_id).cloned().unwrap_or_default(),
            likes: tables.likes.get(&post_id).cloned().unwrap_or_default(),
            _lock: guard,
        };
        drop(tables);

        debug!(post_id = %post_id, "memory transaction opened");
        Ok(Box::new(tx))
    }

    async fn insert_post(&self, post: &Post) -> StoreResult<()> {
        self.inner.ensure_available()?;
        let mut tables = self.inner.tables.write().await;
        if tables.posts.contains_key(&post.id) {
            return Err(StoreError::TransactionAborted(format!(
                "post {} already exists",
                post.id
            )));
        }
        tables.posts.insert(post.id, post.clone());
        Ok(())
    }

    async fn find_post(&self, post_id: Uuid) -> StoreResult<Option<Post>> {
        self.inner.ensure_available()?;
        Ok(self.inner.tables.read().await.posts.get(&post_id).cloned())
    }

    async fn update_caption(
        &self,
        post_id: Uuid,
        author_id: Uuid,
        caption: Option<&str>,
    ) -> StoreResult<Option<Post>> {
        self.inner.ensure_available()?;
        let _guard = self.inner.lock_post(post_id).await;

        let mut tables = self.inner.tables.write().await;
        match tables.posts.get_mut(&post_id) {
            Some(post) if post.author_id == author_id => {
                post.caption = caption.map(str::to_string);
                Ok(Some(post.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn find_comment(&self, comment_id: Uuid) -> StoreResult<Option<Comment>> {
        self.inner.ensure_available()?;
        let tables = self.inner.tables.read().await;
        Ok(tables
            .comments
            .values()
            .find_map(|by_id| by_id.get(&comment_id))
            .cloned())
    }

    async fn find_like(&self, like_id: Uuid) -> StoreResult<Option<Like>> {
        self.inner.ensure_available()?;
        let tables = self.inner.tables.read().await;
        Ok(tables
            .likes
            .values()
            .find_map(|by_id| by_id.get(&like_id))
            .cloned())
    }

    async fn has_liked(&self, post_id: Uuid, user_id: Uuid) -> StoreResult<bool> {
        self.inner.ensure_available()?;
        let tables = self.inner.tables.read().await;
        Ok(tables
            .likes
            .get(&post_id)
            .map(|likes| likes.values().any(|l| l.user_id == user_id))
            .unwrap_or(false))
    }

    async fn count_children(&self, post_id: Uuid, counter: Counter) -> StoreResult<i64> {
        self.inner.ensure_available()?;
        let tables = self.inner.tables.read().await;
        let count = match counter {
            Counter::Comments => tables.comments.get(&post_id).map_or(0, HashMap::len),
            Counter::Likes => tables.likes.get(&post_id).map_or(0, HashMap::len),
        };
        Ok(count as i64)
    }

    async fn list_comments(
        &self,
        post_id: Uuid,
        page: Pagination,
    ) -> StoreResult<(Vec<Comment>, i64)> {
        self.inner.ensure_available()?;
        let tables = self.inner.tables.read().await;

        let mut comments: Vec<Comment> = tables
            .comments
            .get(&post_id)
            .map(|by_id| by_id.values().cloned().collect())
            .unwrap_or_default();
        comments.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));

        let total = comments.len() as i64;
        Ok((paginate(comments, page), total))
    }

    async fn list_posts_by_author(
        &self,
        author_id: Uuid,
        page: Pagination,
    ) -> StoreResult<(Vec<Post>, i64)> {
        self.inner.ensure_available()?;
        let tables = self.inner.tables.read().await;

        let mut posts: Vec<Post> = tables
            .posts
            .values()
            .filter(|p| p.author_id == author_id)
            .cloned()
            .collect();
        posts.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));

        let total = posts.len() as i64;
        Ok((paginate(posts, page), total))
    }

    async fn find_authors(&self, ids: &[Uuid]) -> StoreResult<HashMap<Uuid, AuthorSummary>> {
        self.inner.ensure_available()?;
        let tables = self.inner.tables.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| tables.authors.get(id).map(|a| (*id, a.clone())))
            .collect())
    }

    async fn ping(&self) -> StoreResult<()> {
        self.inner.ensure_available()
    }
}

/// Staged copy of one aggregate, published on commit
pub struct MemoryTx {
    inner: Arc<Inner>,
    post_id: Uuid,
    existed: bool,
    post: Option<Post>,
    comments: HashMap<Uuid, Comment>,
    likes: HashMap<Uuid, Like>,
    _lock: PostLock,
}

#[async_trait]
impl AggregateTx for MemoryTx {
    fn post_id(&self) -> Uuid {
        self.post_id
    }

    async fn post(&mut self) -> StoreResult<Option<Post>> {
        self.inner.ensure_available()?;
        Ok(self.post.clone())
    }

    async fn insert_comment(&mut self, comment: &Comment) -> StoreResult<()> {
        self.inner.ensure_available()?;
        if self.post.is_none() {
            return Err(StoreError::TransactionAborted(format!(
                "post {} does not exist",
                self.post_id
            )));
        }
        let mut comment = comment.clone();
        comment.post_id = self.post_id;
        self.comments.insert(comment.id, comment);
        Ok(())
    }

    async fn find_comment(&mut self, comment_id: Uuid) -> StoreResult<Option<Comment>> {
        self.inner.ensure_available()?;
        Ok(self.comments.get(&comment_id).cloned())
    }

    async fn delete_comment(&mut self, comment_id: Uuid) -> StoreResult<bool> {
        self.inner.ensure_available()?;
        Ok(self.comments.remove(&comment_id).is_some())
    }

    async fn find_like(&mut self, user_id: Uuid) -> StoreResult<Option<Like>> {
        self.inner.ensure_available()?;
        if self.inner.miss_next_like_lookup.swap(false, Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(self.likes.values().find(|l| l.user_id == user_id).cloned())
    }

    async fn insert_like(&mut self, like: &Like) -> StoreResult<bool> {
        self.inner.ensure_available()?;
        if self.post.is_none() {
            return Err(StoreError::TransactionAborted(format!(
                "post {} does not exist",
                self.post_id
            )));
        }
        if self.likes.values().any(|l| l.user_id == like.user_id) {
            return Ok(false);
        }
        let mut like = like.clone();
        like.post_id = self.post_id;
        self.likes.insert(like.id, like);
        Ok(true)
    }

    async fn delete_like(&mut self, like_id: Uuid) -> StoreResult<bool> {
        self.inner.ensure_available()?;
        Ok(self.likes.remove(&like_id).is_some())
    }

    async fn adjust_counter(&mut self, counter: Counter, delta: i64) -> StoreResult<Option<i64>> {
        self.inner.ensure_available()?;
        Ok(self.post.as_mut().map(|post| {
            let value = (post.counter(counter) + delta).max(0);
            post.set_counter(counter, value);
            value
        }))
    }

    async fn count_children(&mut self, counter: Counter) -> StoreResult<i64> {
        self.inner.ensure_available()?;
        let count = match counter {
            Counter::Comments => self.comments.len(),
            Counter::Likes => self.likes.len(),
        };
        Ok(count as i64)
    }

    async fn set_counter(&mut self, counter: Counter, value: i64) -> StoreResult<()> {
        self.inner.ensure_available()?;
        if let Some(post) = self.post.as_mut() {
            post.set_counter(counter, value.max(0));
        }
        Ok(())
    }

    async fn delete_children(&mut self) -> StoreResult<(u64, u64)> {
        self.inner.ensure_available()?;
        let removed = (self.comments.len() as u64, self.likes.len() as u64);
        self.comments.clear();
        self.likes.clear();
        Ok(removed)
    }

    async fn delete_post(&mut self) -> StoreResult<bool> {
        self.inner.ensure_available()?;
        Ok(self.post.take().is_some())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.inner.ensure_available()?;
        if self.inner.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::TransactionAborted(
                "injected commit failure".to_string(),
            ));
        }

        let MemoryTx {
            inner,
            post_id,
            existed,
            post,
            comments,
            likes,
            _lock,
        } = *self;

        let mut tables = inner.tables.write().await;
        match post {
            Some(post) => {
                tables.posts.insert(post_id, post);
                tables.comments.insert(post_id, comments);
                tables.likes.insert(post_id, likes);
            }
            None if existed => {
                tables.posts.remove(&post_id);
                tables.comments.remove(&post_id);
                tables.likes.remove(&post_id);
            }
            None => {}
        }
        drop(tables);

        debug!(post_id = %post_id, "memory transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        debug!(post_id = %self.post_id, "memory transaction rolled back");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MediaKind, NewPost};
    use std::time::Duration;

    fn sample_post() -> Post {
        Post::new(NewPost {
            author_id: Uuid::new_v4(),
            caption: Some("hello".into()),
            media_url: "memory://media/a.jpg".into(),
            media_urls: vec![],
            media_kind: MediaKind::Image,
        })
    }

    #[tokio::test]
    async fn test_dropped_transaction_publishes_nothing() {
        let store = MemoryStore::new();
        let post = sample_post();
        store.insert_post(&post).await.unwrap();

        {
            let mut tx = store.begin(post.id).await.unwrap();
            tx.insert_comment(&Comment::new(post.id, Uuid::new_v4(), "hi".into()))
                .await
                .unwrap();
            tx.adjust_counter(Counter::Comments, 1).await.unwrap();
        }

        let stored = store.find_post(post.id).await.unwrap().unwrap();
        assert_eq!(stored.comment_count, 0);
        assert_eq!(store.count_children(post.id, Counter::Comments).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_commit_publishes_staged_changes() {
        let store = MemoryStore::new();
        let post = sample_post();
        store.insert_post(&post).await.unwrap();

        let mut tx = store.begin(post.id).await.unwrap();
        assert!(tx.insert_like(&Like::new(post.id, Uuid::new_v4())).await.unwrap());
        assert_eq!(tx.adjust_counter(Counter::Likes, 1).await.unwrap(), Some(1));
        tx.commit().await.unwrap();

        let stored = store.find_post(post.id).await.unwrap().unwrap();
        assert_eq!(stored.like_count, 1);
        assert_eq!(store.count_children(post.id, Counter::Likes).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_like_rejected() {
        let store = MemoryStore::new();
        let post = sample_post();
        store.insert_post(&post).await.unwrap();
        let user = Uuid::new_v4();

        let mut tx = store.begin(post.id).await.unwrap();
        assert!(tx.insert_like(&Like::new(post.id, user)).await.unwrap());
        assert!(!tx.insert_like(&Like::new(post.id, user)).await.unwrap());
    }

    #[tokio::test]
    async fn test_counter_floors_at_zero() {
        let store = MemoryStore::new();
        let post = sample_post();
        store.insert_post(&post).await.unwrap();

        let mut tx = store.begin(post.id).await.unwrap();
        assert_eq!(tx.adjust_counter(Counter::Comments, -1).await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn test_same_post_transactions_are_serialized() {
        let store = MemoryStore::new();
        let post = sample_post();
        store.insert_post(&post).await.unwrap();

        let first = store.begin(post.id).await.unwrap();
        let second = tokio::time::timeout(Duration::from_millis(50), store.begin(post.id)).await;
        assert!(second.is_err(), "second transaction must wait for the lock");

        drop(first);
        let second = tokio::time::timeout(Duration::from_millis(50), store.begin(post.id)).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_other_posts_do_not_contend() {
        let store = MemoryStore::new();
        let a = sample_post();
        let b = sample_post();
        store.insert_post(&a).await.unwrap();
        store.insert_post(&b).await.unwrap();

        let _held = store.begin(a.id).await.unwrap();
        let other = tokio::time::timeout(Duration::from_millis(50), store.begin(b.id)).await;
        assert!(other.is_ok());
    }

    #[tokio::test]
    async fn test_injected_commit_failure() {
        let store = MemoryStore::new();
        let post = sample_post();
        store.insert_post(&post).await.unwrap();
        store.inject_commit_failure();

        let mut tx = store.begin(post.id).await.unwrap();
        tx.adjust_counter(Counter::Likes, 1).await.unwrap();
        assert!(matches!(
            tx.commit().await,
            Err(StoreError::TransactionAborted(_))
        ));
        assert_eq!(store.find_post(post.id).await.unwrap().unwrap().like_count, 0);
    }

    #[tokio::test]
    async fn test_offline_store_fails_everything() {
        let store = MemoryStore::new();
        store.set_available(false);
        assert!(matches!(store.ping().await, Err(StoreError::Unavailable(_))));
        assert!(matches!(
            store.begin(Uuid::new_v4()).await,
            Err(StoreError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_lock_entries_released_after_every_transaction() {
        let store = MemoryStore::new();
        for _ in 0..100 {
            let tx = store.begin(Uuid::new_v4()).await.unwrap();
            drop(tx);
        }
        assert_eq!(store.inner.post_locks.len(), 0);

        let post = sample_post();
        store.insert_post(&post).await.unwrap();
        let mut tx = store.begin(post.id).await.unwrap();
        tx.adjust_counter(Counter::Likes, 1).await.unwrap();
        tx.commit().await.unwrap();
        store
            .update_caption(post.id, post.author_id, Some("edited"))
            .await
            .unwrap();
        store.force_counter(post.id, Counter::Likes, 3).await;
        assert_eq!(store.inner.post_locks.len(), 0);
    }

    #[tokio::test]
    async fn test_lock_entry_kept_while_another_task_waits() {
        let store = MemoryStore::new();
        let post = sample_post();
        store.insert_post(&post).await.unwrap();

        let first = store.begin(post.id).await.unwrap();
        let waiter = {
            let store = store.clone();
            let post_id = post.id;
            tokio::spawn(async move {
                let mut tx = store.begin(post_id).await.unwrap();
                tx.adjust_counter(Counter::Comments, 1).await.unwrap();
                tx.commit().await.unwrap();
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(first);
        assert_eq!(store.inner.post_locks.len(), 1);

        waiter.await.unwrap();
        assert_eq!(store.inner.post_locks.len(), 0);
        let stored = store.find_post(post.id).await.unwrap().unwrap();
        assert_eq!(stored.comment_count, 1);
    }

    #[tokio::test]
    async fn test_deleting_post_removes_children() {
        let store = MemoryStore::new();
        let post = sample_post();
        store.insert_post(&post).await.unwrap();

        let mut tx = store.begin(post.id).await.unwrap();
        tx.insert_comment(&Comment::new(post.id, Uuid::new_v4(), "x".into()))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin(post.id).await.unwrap();
        assert_eq!(tx.delete_children().await.unwrap(), (1, 0));
        assert!(tx.delete_post().await.unwrap());
        tx.commit().await.unwrap();

        assert!(store.find_post(post.id).await.unwrap().is_none());
        assert_eq!(store.orphan_count().await, 0);
    }
}
