//! Streaming blob storage
//!
//! Uploads consume their body incrementally; the final size is never needed
//! up front.

use eyre::{Context, Result};
use object_store::ObjectStore;
use object_store::aws::AmazonS3Builder;
use object_store::buffered::BufWriter;
use object_store::path::Path as ObjectPath;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWriteExt};

/// A store that can upload a byte stream to `bucket/key`
pub trait BlobStore: Send + Sync + 'static {
    /// Stream `body` to `bucket/key` until EOF, returning the bytes uploaded
    ///
    /// # Errors
    /// Returns an error if reading `body` fails or the store rejects the write.
    /// Nothing is committed when `body` fails before EOF.
    fn put_stream<R>(
        &self,
        bucket: &str,
        key: &str,
        body: R,
    ) -> impl Future<Output = Result<u64>> + Send
    where
        R: AsyncRead + Send + Unpin + 'static;
}

/// Connection settings for an S3 (or S3-compatible) bucket
#[derive(Clone, Default)]
pub struct S3Settings {
    pub region: String,
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

impl std::fmt::Debug for S3Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Settings")
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &self.secret_access_key.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Bytes buffered before an upload switches to multipart, and the part size after
pub const DEFAULT_PART_SIZE: usize = 10 * 1024 * 1024;

/// [`BlobStore`] backed by `object_store`, one store per bucket
#[derive(Clone)]
pub struct ObjectStoreBlob {
    stores: HashMap<String, Arc<dyn ObjectStore>>,
    part_size: usize,
}

impl Default for ObjectStoreBlob {
    fn default() -> Self {
        Self {
            stores: HashMap::new(),
            part_size: DEFAULT_PART_SIZE,
        }
    }
}

impl ObjectStoreBlob {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the multipart part size; objects no larger than this go up in one put
    pub fn with_part_size(mut self, part_size: usize) -> Self {
        self.part_size = part_size.max(1);
        self
    }

    /// Serve `bucket` from `store`
    pub fn with_bucket(mut self, bucket: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
        self.stores.insert(bucket.into(), store);
        self
    }

    /// Build an S3-backed store for `bucket` from explicit settings
    ///
    /// Credentials not given in `settings` are resolved by the AWS SDK chain
    /// (environment, profile, instance role).
    pub fn s3(bucket: &str, settings: &S3Settings) -> Result<Self> {
        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .with_region(&settings.region);

        if let (Some(id), Some(secret)) = (&settings.access_key_id, &settings.secret_access_key) {
            builder = builder
                .with_access_key_id(id)
                .with_secret_access_key(secret);
        }
        if let Some(endpoint) = &settings.endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"));
        }

        let store = builder
            .build()
            .with_context(|| format!("Failed to configure S3 bucket '{}'", bucket))?;
        Ok(Self::new().with_bucket(bucket, Arc::new(store)))
    }

    /// Confirm `bucket` is reachable with the configured credentials
    pub async fn check(&self, bucket: &str) -> Result<()> {
        let store = self.store(bucket)?;
        let listing = store
            .list_with_delimiter(None)
            .await
            .with_context(|| format!("Failed to list s3://{}", bucket))?;
        log::debug!(
            "s3://{} reachable ({} top-level prefix(es))",
            bucket,
            listing.common_prefixes.len()
        );
        Ok(())
    }

    fn store(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>> {
        self.stores.get(bucket).cloned().ok_or_else(|| {
            eyre::eyre!(
                "Bucket '{}' is not configured. Available buckets: {}",
                bucket,
                self.stores.keys().cloned().collect::<Vec<_>>().join(", ")
            )
        })
    }
}

impl BlobStore for ObjectStoreBlob {
    async fn put_stream<R>(&self, bucket: &str, key: &str, mut body: R) -> Result<u64>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let store = self.store(bucket)?;
        let path = ObjectPath::parse(key)
            .with_context(|| format!("Invalid object key '{}'", key))?;
        let mut writer = BufWriter::with_capacity(store, path, self.part_size);

        let bytes = match tokio::io::copy(&mut body, &mut writer).await {
            Ok(bytes) => bytes,
            Err(e) => {
                // Release any multipart upload already started; nothing is committed
                if let Err(abort) = writer.abort().await {
                    log::warn!(
                        "Failed to abort upload to s3://{}/{}: {}",
                        bucket,
                        key,
                        abort
                    );
                }
                return Err(e).with_context(|| format!("Failed to stream s3://{}/{}", bucket, key));
            }
        };
        writer
            .shutdown()
            .await
            .with_context(|| format!("Failed to complete upload to s3://{}/{}", bucket, key))?;

        log::debug!("Uploaded {} byte(s) to s3://{}/{}", bytes, bucket, key);
        Ok(bytes)
    }
}
