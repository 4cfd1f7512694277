/// Media blob storage for post attachments
///
/// A [`BlobStore`] accepts an uploaded file and returns a durable public URL,
/// and deletes objects by handle. Deletion is best-effort from the caller's
/// point of view: callers decide whether a failure matters.
///
/// Implementations:
/// - [`S3BlobStore`]: AWS S3 (or any S3-compatible endpoint)
/// - [`MemoryBlobStore`]: in-process store with failure injection for tests
use async_trait::async_trait;
use uuid::Uuid;

pub mod config;
pub mod memory;
pub mod s3;

pub use config::S3Config;
pub use memory::MemoryBlobStore;
pub use s3::S3BlobStore;

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("upload failed: {0}")]
    Upload(String),

    #[error("delete failed: {0}")]
    Delete(String),

    #[error("file of {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },

    #[error("blob store unavailable: {0}")]
    Unavailable(String),
}

/// A file received from a client, ready to be stored
#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub file_name: Option<String>,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl MediaUpload {
    pub fn new(file_name: Option<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name,
            content_type: content_type.into(),
            bytes,
        }
    }

    pub fn is_video(&self) -> bool {
        self.content_type.starts_with("video/")
    }

    /// File extension derived from the file name, falling back to the MIME subtype
    pub fn extension(&self) -> String {
        let from_name = self
            .file_name
            .as_deref()
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()));

        from_name.unwrap_or_else(|| {
            self.content_type
                .parse::<mime::Mime>()
                .ok()
                .map(|m| m.subtype().as_str().to_ascii_lowercase())
                .filter(|sub| sub.chars().all(|c| c.is_ascii_alphanumeric()))
                .unwrap_or_else(|| "bin".to_string())
        })
    }
}

/// Build an object key for an owner's upload: `{prefix}/{owner}/{uuid}.{ext}`
pub fn object_key(prefix: &str, owner: Uuid, upload: &MediaUpload) -> String {
    format!("{}/{}/{}.{}", prefix, owner, Uuid::new_v4(), upload.extension())
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store a file owned by `owner`, returning its public URL
    async fn store(&self, owner: Uuid, upload: MediaUpload) -> Result<String, MediaError>;

    /// Delete by handle. Returns false if the object was already gone.
    async fn delete(&self, handle: &str) -> Result<bool, MediaError>;

    /// Handle for a URL previously returned by [`BlobStore::store`];
    /// None for URLs this store does not own.
    fn handle_for(&self, url: &str) -> Option<String>;
}
