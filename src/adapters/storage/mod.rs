use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;

pub mod s3;

pub use s3::S3Storage;

/// A blob store that hands back stable public URLs for what it stores.
#[async_trait]
pub trait ObjectStorage: Send + Sync + std::fmt::Debug + 'static {
    /// Stores `data` under `key`, replacing anything already there.
    async fn put(&self, key: &str, data: Bytes, content_type: Option<&str>) -> Result<()>;

    /// The public retrieval URL for `key`. Does not check that the object exists.
    fn public_url(&self, key: &str) -> String;

    /// Verifies the store is reachable.
    async fn check(&self) -> Result<()>;
}
