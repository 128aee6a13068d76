use crate::adapters::storage::ObjectStorage;
use crate::config::StorageConfig;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;

/// Builds an S3 client from configuration, honoring custom endpoints and static credentials.
pub async fn build_client(config: &StorageConfig) -> Client {
    let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.region.clone()));

    if let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) {
        let credentials =
            aws_credential_types::Credentials::new(access_key, secret_key, None, None, "bazaar-static-credentials");
        loader = loader.credentials_provider(credentials);
    }

    let sdk_config = loader.load().await;
    let mut builder = Builder::from(&sdk_config).force_path_style(config.force_path_style);
    if let Some(endpoint) = &config.endpoint {
        builder = builder.endpoint_url(endpoint);
    }

    Client::from_conf(builder.build())
}

fn public_base_url(config: &StorageConfig) -> String {
    if let Some(base) = &config.public_base_url {
        return base.trim_end_matches('/').to_string();
    }
    match &config.endpoint {
        Some(endpoint) => format!("{}/{}", endpoint.trim_end_matches('/'), config.bucket),
        None => format!("https://{}.s3.{}.amazonaws.com", config.bucket, config.region),
    }
}

#[derive(Clone, Debug)]
pub struct S3Storage {
    client: Client,
    bucket: String,
    base_url: String,
}

impl S3Storage {
    #[must_use]
    pub fn new(client: Client, config: &StorageConfig) -> Self {
        Self { client, bucket: config.bucket.clone(), base_url: public_base_url(config) }
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn put(&self, key: &str, data: Bytes, content_type: Option<&str>) -> Result<()> {
        let len = i64::try_from(data.len()).unwrap_or(i64::MAX);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_length(len)
            .set_content_type(content_type.map(str::to_string))
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %DisplayErrorContext(&e), key = %key, "S3 upload failed");
                AppError::Upload(format!("S3 upload of {key} failed"))
            })?;

        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{key}", self.base_url)
    }

    async fn check(&self) -> Result<()> {
        self.client.head_bucket().bucket(&self.bucket).send().await.map_err(|e| {
            tracing::debug!(error = %DisplayErrorContext(&e), bucket = %self.bucket, "S3 head bucket failed");
            AppError::Upload(format!("bucket {} unreachable", self.bucket))
        })?;
        Ok(())
    }
}
