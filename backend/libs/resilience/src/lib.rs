/// Resilience helpers for best-effort side effects
///
/// - **Retry**: bounded retries with exponential backoff and jitter
/// - **Timeout**: per-attempt time limits for external calls
///
/// These are used for work that happens outside a database transaction,
/// such as removing media blobs after a post has been deleted.
pub mod retry;
pub mod timeout;

pub use retry::{with_retry, RetryConfig, RetryError};
pub use timeout::{with_timeout, TimeoutError};
