use async_trait::async_trait;
use aws_sdk_s3::config::Builder;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::{Client, config::BehaviorVersion, config::Credentials, config::Region};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("upload failed: {0}")]
    UploadFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid public url: {0}")]
    InvalidUrl(String),
}

/// Where an uploaded file ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub url: String,
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Uploads the file at `path` under `key` and returns its public URL.
    async fn put_file(
        &self,
        key: &str,
        path: &Path,
        content_type: &str,
    ) -> Result<StoredObject, StorageError>;
}

#[derive(Clone)]
pub struct StorageService {
    pub client: Client,
    pub bucket: String,
    public_base: Url,
}

impl StorageService {
    pub async fn new(
        endpoint: &str,
        public_url: &str,
        bucket: &str,
        access_key: &str,
        secret_key: &str,
    ) -> Result<Self, StorageError> {
        let public_base =
            Url::parse(public_url).map_err(|e| StorageError::InvalidUrl(e.to_string()))?;

        let credentials = Credentials::new(access_key, secret_key, None, None, "static");

        let config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .endpoint_url(endpoint)
            .credentials_provider(credentials)
            .force_path_style(true) // Required for MinIO
            .build();

        let client = Client::from_conf(config);

        info!("✅ Connected to S3 (MinIO)");

        Ok(Self {
            client,
            bucket: bucket.to_string(),
            public_base,
        })
    }
}

#[async_trait]
impl ObjectStorage for StorageService {
    async fn put_file(
        &self,
        key: &str,
        path: &Path,
        content_type: &str,
    ) -> Result<StoredObject, StorageError> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::UploadFailed(format!("{}: {}", path.display(), e)))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::UploadFailed(format!("{}: {}", key, e)))?;

        debug!("⬆️ Uploaded {} ({})", key, content_type);

        let url = public_object_url(&self.public_base, &self.bucket, key)?;
        Ok(StoredObject {
            key: key.to_string(),
            url: url.to_string(),
        })
    }
}

/// Path-style object URL: `<base>/<bucket>/<key>`.
pub fn public_object_url(base: &Url, bucket: &str, key: &str) -> Result<Url, StorageError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| StorageError::InvalidUrl(base.to_string()))?
        .pop_if_empty()
        .push(bucket)
        .extend(key.split('/'));
    Ok(url)
}
