#![allow(dead_code)]

use media_store::{MediaUpload, MemoryBlobStore};
use post_service::config::MediaConfig;
use post_service::domain::{AuthorSummary, Post};
use post_service::handlers::HealthState;
use post_service::middleware::JwtIdentity;
use post_service::repository::{AggregateStore, AggregateTx, MemoryStore};
use post_service::services::{self, EngagementService, PostService};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub const JWT_SECRET: &str = "integration-test-secret-at-least-32-bytes";

/// Services over in-memory stores, with handles for fault injection
pub struct TestContext {
    pub store: MemoryStore,
    pub blobs: Arc<MemoryBlobStore>,
    pub posts: PostService,
    pub engagement: EngagementService,
    pub identity: Arc<JwtIdentity>,
}

impl TestContext {
    pub fn new() -> Self {
        let store = MemoryStore::new();
        let blobs = Arc::new(MemoryBlobStore::new());
        let media = MediaConfig {
            max_upload_bytes: 1024 * 1024,
            cleanup_max_retries: 1,
            cleanup_backoff: Duration::ZERO,
            cleanup_attempt_timeout: Duration::from_secs(1),
            ..MediaConfig::default()
        };

        let (posts, engagement) = services::build(Arc::new(store.clone()), blobs.clone(), &media);

        Self {
            store,
            blobs,
            posts,
            engagement,
            identity: Arc::new(JwtIdentity::new(JWT_SECRET)),
        }
    }

    pub fn health(&self) -> HealthState {
        HealthState::new(Arc::new(self.store.clone()), None)
    }

    pub fn bearer(&self, user_id: Uuid) -> (&'static str, String) {
        let token = self.identity.issue(user_id, 3600).unwrap();
        ("Authorization", format!("Bearer {}", token))
    }

    pub async fn author(&self, username: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.store
            .insert_author(AuthorSummary {
                id,
                username: Some(username.to_string()),
                avatar: Some(format!("https://cdn.example.com/{}.png", username)),
            })
            .await;
        id
    }

    /// Create a post with `media` image files owned by `author_id`
    pub async fn post_with_media(&self, author_id: Uuid, media: usize) -> Post {
        let uploads = (0..media)
            .map(|i| MediaUpload::new(Some(format!("photo{}.jpg", i)), "image/jpeg", vec![0xff, 0xd8, i as u8]))
            .collect();
        self.posts
            .create_post(author_id, Some("test post"), uploads)
            .await
            .unwrap()
    }

    pub async fn post(&self, author_id: Uuid) -> Post {
        self.post_with_media(author_id, 1).await
    }

    pub async fn stored_post(&self, post_id: Uuid) -> Option<Post> {
        self.store.find_post(post_id).await.unwrap()
    }

    /// Id of `user_id`'s like on the post, read under the post lock
    pub async fn like_id(&self, post_id: Uuid, user_id: Uuid) -> Uuid {
        let mut tx = self.store.begin(post_id).await.unwrap();
        let like = tx.find_like(user_id).await.unwrap().expect("like exists");
        tx.rollback().await.unwrap();
        like.id
    }

    /// Assert both counters equal the number of child records
    pub async fn assert_counters_consistent(&self, post_id: Uuid) {
        use post_service::domain::Counter;

        let post = self.stored_post(post_id).await.expect("post exists");
        let comments = self
            .store
            .count_children(post_id, Counter::Comments)
            .await
            .unwrap();
        let likes = self.store.count_children(post_id, Counter::Likes).await.unwrap();
        assert_eq!(post.comment_count, comments, "comment_count drifted");
        assert_eq!(post.like_count, likes, "like_count drifted");
    }
}

/// Build an actix test service over a [`TestContext`]
macro_rules! init_app {
    ($ctx:expr) => {
        init_app!($ctx, None)
    };
    ($ctx:expr, $operators:expr) => {{
        let ctx = &$ctx;
        let identity: std::sync::Arc<dyn post_service::middleware::IdentityProvider> =
            ctx.identity.clone();
        let operators: Option<post_service::middleware::Operators> = $operators;
        actix_web::test::init_service(
            actix_web::App::new()
                .app_data(actix_web::web::Data::new(ctx.posts.clone()))
                .app_data(actix_web::web::Data::new(ctx.engagement.clone()))
                .app_data(actix_web::web::Data::new(ctx.health()))
                .wrap(post_service::middleware::IdentityMiddleware::new(identity))
                .configure(move |cfg| post_service::handlers::configure(cfg, operators)),
        )
        .await
    }};
}
