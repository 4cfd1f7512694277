/// In-process blob store
///
/// Keeps objects in a map and can be told to fail uploads or deletions,
/// which lets callers exercise their best-effort cleanup paths.
use crate::{object_key, BlobStore, MediaError, MediaUpload};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

const BASE_URL: &str = "memory://media";

#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<String, MediaUpload>>,
    fail_uploads: AtomicBool,
    fail_deletes: AtomicBool,
    delete_attempts: AtomicU32,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Number of delete calls received, including failed ones
    pub fn delete_attempts(&self) -> u32 {
        self.delete_attempts.load(Ordering::SeqCst)
    }

    pub async fn contains_url(&self, url: &str) -> bool {
        match self.handle_for(url) {
            Some(key) => self.objects.lock().await.contains_key(&key),
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.objects.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.lock().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn store(&self, owner: Uuid, upload: MediaUpload) -> Result<String, MediaError> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(MediaError::Upload("injected upload failure".to_string()));
        }
        let key = object_key("posts", owner, &upload);
        self.objects.lock().await.insert(key.clone(), upload);
        Ok(format!("{}/{}", BASE_URL, key))
    }

    async fn delete(&self, handle: &str) -> Result<bool, MediaError> {
        self.delete_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(MediaError::Delete("injected delete failure".to_string()));
        }
        Ok(self.objects.lock().await.remove(handle).is_some())
    }

    fn handle_for(&self, url: &str) -> Option<String> {
        url.strip_prefix(BASE_URL)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|key| !key.is_empty())
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload() -> MediaUpload {
        MediaUpload::new(Some("cat.jpg".into()), "image/jpeg", vec![0xff, 0xd8])
    }

    #[tokio::test]
    async fn test_store_then_delete() {
        let store = MemoryBlobStore::new();
        let url = store.store(Uuid::new_v4(), upload()).await.unwrap();
        assert!(store.contains_url(&url).await);

        let handle = store.handle_for(&url).unwrap();
        assert!(store.delete(&handle).await.unwrap());
        assert!(!store.delete(&handle).await.unwrap());
        assert!(store.is_empty().await);
        assert_eq!(store.delete_attempts(), 2);
    }

    #[tokio::test]
    async fn test_injected_delete_failure() {
        let store = MemoryBlobStore::new();
        let url = store.store(Uuid::new_v4(), upload()).await.unwrap();
        store.fail_deletes(true);

        let handle = store.handle_for(&url).unwrap();
        assert!(matches!(store.delete(&handle).await, Err(MediaError::Delete(_))));
        assert!(store.contains_url(&url).await);
    }

    #[test]
    fn test_handle_for_foreign_url() {
        let store = MemoryBlobStore::new();
        assert_eq!(store.handle_for("https://example.com/a.jpg"), None);
    }
}
