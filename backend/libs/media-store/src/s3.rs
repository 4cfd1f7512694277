/// S3-backed blob store
use crate::{object_key, BlobStore, MediaError, MediaUpload, S3Config};
use async_trait::async_trait;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

#[derive(Clone)]
pub struct S3BlobStore {
    client: Arc<Client>,
    config: S3Config,
}

impl S3BlobStore {
    pub fn new(client: Arc<Client>, config: S3Config) -> Self {
        Self { client, config }
    }

    /// Build a client from the ambient AWS credentials chain
    pub async fn from_config(config: S3Config) -> Self {
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;

        let mut builder =
            aws_sdk_s3::config::Builder::from(&sdk_config).force_path_style(config.path_style);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        Self::new(Arc::new(Client::from_conf(builder.build())), config)
    }

    pub fn config(&self) -> &S3Config {
        &self.config
    }

    /// Health check for S3 connectivity
    pub async fn health_check(&self) -> Result<(), MediaError> {
        self.client
            .head_bucket()
            .bucket(&self.config.bucket)
            .send()
            .await
            .map_err(|e| MediaError::Unavailable(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn store(&self, owner: Uuid, upload: MediaUpload) -> Result<String, MediaError> {
        let key = object_key(&self.config.key_prefix, owner, &upload);
        let size = upload.bytes.len();

        self.client
            .put_object()
            .bucket(&self.config.bucket)
            .key(&key)
            .content_type(&upload.content_type)
            .body(ByteStream::from(upload.bytes))
            .send()
            .await
            .map_err(|e| MediaError::Upload(e.to_string()))?;

        debug!(key = %key, size, "stored media object");
        Ok(self.config.public_url(&key))
    }

    async fn delete(&self, handle: &str) -> Result<bool, MediaError> {
        // S3 DeleteObject succeeds for missing keys, so existence is not reported
        self.client
            .delete_object()
            .bucket(&self.config.bucket)
            .key(handle)
            .send()
            .await
            .map_err(|e| MediaError::Delete(e.to_string()))?;

        debug!(key = %handle, "deleted media object");
        Ok(true)
    }

    fn handle_for(&self, url: &str) -> Option<String> {
        self.config.key_from_url(url)
    }
}
