/// Per-attempt time limits
use std::future::Future;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum TimeoutError<E> {
    #[error("no response within {0:?}")]
    Elapsed(Duration),
    #[error("{0}")]
    Failed(E),
}

impl<E> TimeoutError<E> {
    pub fn is_elapsed(&self) -> bool {
        matches!(self, TimeoutError::Elapsed(_))
    }
}

/// Await `future` for at most `limit`; an inner error passes through as `Failed`
pub async fn with_timeout<F, T, E>(limit: Duration, future: F) -> Result<T, TimeoutError<E>>
where
    F: Future<Output = Result<T, E>>,
{
    tokio::time::timeout(limit, future)
        .await
        .map_err(|_| TimeoutError::Elapsed(limit))?
        .map_err(TimeoutError::Failed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_timeout_success() {
        let result = with_timeout(Duration::from_secs(1), async { Ok::<_, String>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_timeout_elapsed() {
        let result = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok::<_, String>(42)
        })
        .await;

        assert!(result.unwrap_err().is_elapsed());
    }

    #[tokio::test]
    async fn test_timeout_keeps_inner_error() {
        let result =
            with_timeout(Duration::from_secs(1), async { Err::<i32, _>("boom".to_string()) })
                .await;

        match result {
            Err(TimeoutError::Failed(msg)) => assert_eq!(msg, "boom"),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
