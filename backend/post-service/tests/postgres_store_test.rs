//! Counted-collection operations against a real Postgres.
//!
//! Skipped unless `TEST_DATABASE_URL` points at a disposable database.
use media_store::{MediaUpload, MemoryBlobStore};
use post_service::config::MediaConfig;
use post_service::domain::Counter;
use post_service::repository::{AggregateStore, AggregateTx, PgAggregateStore};
use post_service::services::{self, EngagementService, PostService};
use post_service::AppError;
use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

struct PgContext {
    store: PgAggregateStore,
    posts: PostService,
    engagement: EngagementService,
}

async fn setup() -> Option<PgContext> {
    let url = std::env::var("TEST_DATABASE_URL").ok()?;
    let pool = db_pool::create_pool(db_pool::DbConfig {
        service_name: "post-service-test".to_string(),
        database_url: url,
        max_connections: 20,
        min_connections: 1,
        ..db_pool::DbConfig::default()
    })
    .await
    .expect("connect to TEST_DATABASE_URL");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("run migrations");

    let store = PgAggregateStore::new(pool);
    let media = MediaConfig {
        cleanup_max_retries: 0,
        cleanup_backoff: Duration::ZERO,
        ..MediaConfig::default()
    };
    let (posts, engagement) = services::build(
        Arc::new(store.clone()),
        Arc::new(MemoryBlobStore::new()),
        &media,
    );
    Some(PgContext {
        store,
        posts,
        engagement,
    })
}

async fn new_post(ctx: &PgContext, author: Uuid) -> Uuid {
    let upload = MediaUpload::new(Some("a.jpg".to_string()), "image/jpeg", vec![1, 2, 3]);
    ctx.posts
        .create_post(author, Some("pg"), vec![upload])
        .await
        .unwrap()
        .id
}

async fn assert_consistent(ctx: &PgContext, post_id: Uuid) {
    let post = ctx.store.find_post(post_id).await.unwrap().expect("post");
    let comments = ctx
        .store
        .count_children(post_id, Counter::Comments)
        .await
        .unwrap();
    let likes = ctx.store.count_children(post_id, Counter::Likes).await.unwrap();
    assert_eq!(post.comment_count, comments);
    assert_eq!(post.like_count, likes);
}

#[tokio::test]
#[serial]
async fn test_pg_like_toggle_and_comments() {
    let Some(ctx) = setup().await else {
        eprintln!("TEST_DATABASE_URL not set, skipping");
        return;
    };
    let post_id = new_post(&ctx, Uuid::new_v4()).await;
    let user = Uuid::new_v4();

    let liked = ctx.engagement.toggle_like(post_id, user).await.unwrap();
    assert!(liked.liked);
    assert_eq!(liked.like_count, 1);
    let unliked = ctx.engagement.toggle_like(post_id, user).await.unwrap();
    assert!(!unliked.liked);
    assert_eq!(unliked.like_count, 0);

    let view = ctx
        .engagement
        .add_comment(post_id, user, "from postgres")
        .await
        .unwrap();
    assert_eq!(view.author.username, None);
    let removed = ctx
        .engagement
        .remove_comment(post_id, view.id, user)
        .await
        .unwrap();
    assert_eq!(removed.comment_count, 0);

    assert_consistent(&ctx, post_id).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_pg_concurrent_engagement_keeps_counters_exact() {
    let Some(ctx) = setup().await else {
        eprintln!("TEST_DATABASE_URL not set, skipping");
        return;
    };
    let post_id = new_post(&ctx, Uuid::new_v4()).await;

    let mut handles = Vec::new();
    for i in 0..20 {
        let engagement = ctx.engagement.clone();
        handles.push(tokio::spawn(async move {
            let user = Uuid::new_v4();
            engagement.toggle_like(post_id, user).await.unwrap();
            engagement
                .add_comment(post_id, user, &format!("comment {}", i))
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let post = ctx.posts.get_post(post_id).await.unwrap();
    assert_eq!(post.like_count, 20);
    assert_eq!(post.comment_count, 20);
    assert_consistent(&ctx, post_id).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_pg_same_user_toggles_serialize() {
    let Some(ctx) = setup().await else {
        eprintln!("TEST_DATABASE_URL not set, skipping");
        return;
    };
    let post_id = new_post(&ctx, Uuid::new_v4()).await;
    let user = Uuid::new_v4();

    let handles: Vec<_> = (0..5)
        .map(|_| {
            let engagement = ctx.engagement.clone();
            tokio::spawn(async move { engagement.toggle_like(post_id, user).await.unwrap() })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    assert!(ctx.store.has_liked(post_id, user).await.unwrap());
    let post = ctx.posts.get_post(post_id).await.unwrap();
    assert_eq!(post.like_count, 1);
}

#[tokio::test]
#[serial]
async fn test_pg_delete_post_cascades() {
    let Some(ctx) = setup().await else {
        eprintln!("TEST_DATABASE_URL not set, skipping");
        return;
    };
    let owner = Uuid::new_v4();
    let post_id = new_post(&ctx, owner).await;
    let mut comment_ids = Vec::new();
    let mut like_ids = Vec::new();
    for i in 0..3 {
        let user = Uuid::new_v4();
        ctx.engagement.toggle_like(post_id, user).await.unwrap();
        let mut tx = ctx.store.begin(post_id).await.unwrap();
        like_ids.push(tx.find_like(user).await.unwrap().expect("like").id);
        tx.rollback().await.unwrap();

        let view = ctx
            .engagement
            .add_comment(post_id, user, &format!("c{}", i))
            .await
            .unwrap();
        comment_ids.push(view.id);
    }

    let err = ctx
        .engagement
        .delete_post(post_id, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let deleted = ctx.engagement.delete_post(post_id, owner).await.unwrap();
    assert_eq!(deleted.comments_removed, 3);
    assert_eq!(deleted.likes_removed, 3);

    assert!(ctx.store.find_post(post_id).await.unwrap().is_none());
    assert_eq!(
        ctx.store
            .count_children(post_id, Counter::Comments)
            .await
            .unwrap(),
        0
    );
    assert_eq!(
        ctx.store.count_children(post_id, Counter::Likes).await.unwrap(),
        0
    );

    for id in comment_ids {
        assert!(ctx.store.find_comment(id).await.unwrap().is_none());
    }
    for id in like_ids {
        assert!(ctx.store.find_like(id).await.unwrap().is_none());
    }

    let err = ctx
        .engagement
        .toggle_like(post_id, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}
