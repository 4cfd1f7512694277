pub mod engagement;
pub mod media_cleanup;
pub mod posts;

pub use engagement::EngagementService;
pub use media_cleanup::{CleanupReport, MediaCleanup};
pub use posts::PostService;

use crate::config::MediaConfig;
use crate::repository::AggregateStore;
use media_store::BlobStore;
use std::sync::Arc;

/// Wire both services over one store and blob store
pub fn build(
    store: Arc<dyn AggregateStore>,
    blobs: Arc<dyn BlobStore>,
    media: &MediaConfig,
) -> (PostService, EngagementService) {
    let cleanup = MediaCleanup::new(
        blobs.clone(),
        media.cleanup_retry(),
        media.cleanup_attempt_timeout,
    );
    let posts = PostService::new(
        store.clone(),
        blobs,
        cleanup.clone(),
        media.max_upload_bytes,
    );
    let engagement = EngagementService::new(store, cleanup);
    (posts, engagement)
}
