/// Post-commit media removal
///
/// Runs after a post deletion has committed. Each blob is deleted with its
/// own retry budget and per-attempt timeout; failures are counted and logged
/// and never reach the caller.
use crate::metrics::BLOB_CLEANUP_FAILURES;
use futures::future::join_all;
use media_store::BlobStore;
use resilience::{with_retry, with_timeout, RetryConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// What a cleanup pass achieved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: usize,
    pub failed: usize,
    /// URLs not owned by the configured blob store
    pub skipped: usize,
}

#[derive(Clone)]
pub struct MediaCleanup {
    blobs: Arc<dyn BlobStore>,
    retry: RetryConfig,
    attempt_timeout: Duration,
}

enum Disposition {
    Removed,
    Failed,
    Skipped,
}

impl MediaCleanup {
    pub fn new(blobs: Arc<dyn BlobStore>, retry: RetryConfig, attempt_timeout: Duration) -> Self {
        Self {
            blobs,
            retry,
            attempt_timeout,
        }
    }

    /// Delete every URL concurrently, best-effort
    pub async fn remove_all(&self, post_id: Uuid, urls: &[String]) -> CleanupReport {
        let outcomes = join_all(urls.iter().map(|url| self.remove_one(post_id, url))).await;

        let mut report = CleanupReport::default();
        for outcome in outcomes {
            match outcome {
                Disposition::Removed => report.removed += 1,
                Disposition::Failed => report.failed += 1,
                Disposition::Skipped => report.skipped += 1,
            }
        }

        if report.failed > 0 {
            warn!(
                post_id = %post_id,
                removed = report.removed,
                failed = report.failed,
                "media cleanup left blobs behind"
            );
        } else {
            info!(post_id = %post_id, removed = report.removed, "media cleanup finished");
        }
        report
    }

    async fn remove_one(&self, post_id: Uuid, url: &str) -> Disposition {
        let Some(handle) = self.blobs.handle_for(url) else {
            debug!(post_id = %post_id, url, "media URL not owned by blob store, skipping");
            return Disposition::Skipped;
        };

        let result = with_retry(&self.retry, "media_cleanup", || {
            with_timeout(self.attempt_timeout, self.blobs.delete(&handle))
        })
        .await;

        match result {
            Ok(existed) => {
                debug!(post_id = %post_id, handle = %handle, existed, "media blob removed");
                Disposition::Removed
            }
            Err(e) => {
                BLOB_CLEANUP_FAILURES.inc();
                warn!(
                    post_id = %post_id,
                    handle = %handle,
                    attempts = e.attempts(),
                    error = %e.into_last(),
                    "failed to remove media blob"
                );
                Disposition::Failed
            }
        }
    }
}
