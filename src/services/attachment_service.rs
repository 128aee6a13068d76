use crate::adapters::storage::ObjectStorage;
use crate::domain::message::ImageUpload;
use crate::error::Result;
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub(crate) struct Metrics {
    pub(crate) uploads_total: Counter<u64>,
    pub(crate) upload_size_bytes: Histogram<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("bazaar-server");
        Self {
            uploads_total: meter
                .u64_counter("bazaar_chat_images_uploaded_total")
                .with_description("Chat image upload attempts")
                .build(),
            upload_size_bytes: meter
                .u64_histogram("bazaar_chat_image_size_bytes")
                .with_description("Distribution of chat image sizes")
                .build(),
        }
    }
}

/// Object key for a chat image. Keys sort by upload time within a conversation; the
/// `upload_id` suffix keeps uploads landing in the same millisecond apart.
#[must_use]
pub fn image_key(conversation_id: Uuid, uploaded_at: OffsetDateTime, upload_id: Uuid, extension: &str) -> String {
    let millis = uploaded_at.unix_timestamp_nanos() / 1_000_000;
    format!("chat/{conversation_id}/{millis}-{upload_id}.{extension}")
}

#[derive(Clone, Debug)]
pub struct AttachmentService {
    storage: Arc<dyn ObjectStorage>,
    metrics: Metrics,
}

impl AttachmentService {
    #[must_use]
    pub fn new(storage: Arc<dyn ObjectStorage>) -> Self {
        Self { storage, metrics: Metrics::new() }
    }

    /// Stores a chat image and returns its public URL.
    ///
    /// # Errors
    /// Returns `AppError::Upload` if the object store rejects the write.
    #[tracing::instrument(
        err(level = "warn"),
        skip(self, image),
        fields(size = image.data.len(), key = tracing::field::Empty)
    )]
    pub async fn upload_image(&self, conversation_id: Uuid, image: &ImageUpload) -> Result<String> {
        let key = image_key(conversation_id, OffsetDateTime::now_utc(), Uuid::new_v4(), &image.extension());
        tracing::Span::current().record("key", tracing::field::display(&key));

        let size = image.data.len() as u64;
        match self.storage.put(&key, image.data.clone(), image.content_type.as_deref()).await {
            Ok(()) => {
                self.metrics.uploads_total.add(1, &[KeyValue::new("status", "success")]);
                self.metrics.upload_size_bytes.record(size, &[]);
                Ok(self.storage.public_url(&key))
            }
            Err(e) => {
                self.metrics.uploads_total.add(1, &[KeyValue::new("status", "failure")]);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_key_layout() {
        let id = Uuid::nil();
        let upload = Uuid::from_u128(7);
        let at = OffsetDateTime::from_unix_timestamp_nanos(1_709_294_400_123_456_789).expect("timestamp");
        assert_eq!(image_key(id, at, upload, "png"), format!("chat/{id}/1709294400123-{upload}.png"));
    }

    #[test]
    fn test_same_millisecond_uploads_get_distinct_keys() {
        let id = Uuid::new_v4();
        let at = OffsetDateTime::now_utc();
        assert_ne!(image_key(id, at, Uuid::new_v4(), "jpg"), image_key(id, at, Uuid::new_v4(), "jpg"));
    }
}
