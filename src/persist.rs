use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::Utc;
use url::Url;

use crate::image_codec::{detect_mime_type, parse_data_uri};
use crate::storage::{
    DocumentStore, IMAGES_COLLECTION, ObjectStore, StoreError, StoredImageRecord,
    get_extension_from_mime_type, sanitize_owner, sha256_hex,
};

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("{0}")]
    InvalidImageFormat(String),

    #[error("upload failed: {0}")]
    Upload(#[source] StoreError),

    #[error("stored object failed integrity check: {key}")]
    Integrity { key: String },

    #[error("object store returned a non-http url: {0}")]
    InvalidUrl(String),

    #[error("metadata write failed: {0}")]
    Record(#[source] StoreError),

    #[error("none of the {attempted} images could be saved")]
    NothingPersisted { attempted: usize },
}

/// Context recorded next to each stored image.
#[derive(Clone, Debug)]
pub struct PersistContext {
    pub prompt: String,
    pub style: String,
    pub photos_count: usize,
}

/// Uploads generated images and records their metadata.
#[derive(Clone)]
pub struct ArtifactPersister {
    objects: Arc<dyn ObjectStore>,
    documents: Arc<dyn DocumentStore>,
    sequence: Arc<AtomicU64>,
}

impl ArtifactPersister {
    pub fn new(objects: Arc<dyn ObjectStore>, documents: Arc<dyn DocumentStore>) -> Self {
        Self {
            objects,
            documents,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Stores one `data:` URI and returns the saved record. Anything that is
    /// not a base64 data URI is rejected before touching storage.
    pub async fn persist(
        &self,
        data_uri: &str,
        owner: &str,
        context: &PersistContext,
    ) -> Result<StoredImageRecord, PersistError> {
        let parsed = parse_data_uri(data_uri)
            .map_err(|err| PersistError::InvalidImageFormat(err.to_string()))?;
        let bytes = STANDARD
            .decode(parsed.payload.trim())
            .map_err(|err| PersistError::InvalidImageFormat(format!("bad base64 payload: {err}")))?;

        // Provider mime types are sometimes generic; trust the magic bytes.
        let mime_type = detect_mime_type(&bytes).unwrap_or(parsed.mime_type.as_str());

        let now = Utc::now();
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let key = format!(
            "generated/{}/{}_{sequence}.{}",
            sanitize_owner(owner),
            now.timestamp_millis(),
            get_extension_from_mime_type(mime_type)
        );

        let stored = StoredImageRecord {
            id: String::new(),
            owner: owner.to_string(),
            url: String::new(),
            created_at: now.to_rfc3339(),
            prompt: context.prompt.clone(),
            style: context.style.clone(),
            photos_count: context.photos_count,
            storage_key: key.clone(),
        };
        match self.store_and_record(stored, &bytes, mime_type).await {
            Ok(record) => {
                tracing::info!(owner, id = %record.id, key = %key, size = bytes.len(), "image persisted");
                Ok(record)
            }
            Err(err) => {
                // nothing references the object yet
                self.discard_object(&key).await;
                Err(err)
            }
        }
    }

    /// Upload, verify, publish and record. The caller cleans up the object
    /// when any step fails.
    async fn store_and_record(
        &self,
        mut record: StoredImageRecord,
        bytes: &[u8],
        mime_type: &str,
    ) -> Result<StoredImageRecord, PersistError> {
        let key = record.storage_key.clone();
        self.objects
            .put_object(&key, bytes, mime_type)
            .await
            .map_err(PersistError::Upload)?;
        self.verify_upload(&key, bytes).await?;
        self.objects
            .make_public(&key)
            .await
            .map_err(PersistError::Upload)?;

        let url = self.objects.public_url(&key);
        match Url::parse(&url) {
            Ok(parsed_url) if matches!(parsed_url.scheme(), "http" | "https") => {}
            _ => return Err(PersistError::InvalidUrl(url)),
        }
        record.url = url;

        let document = serde_json::to_value(&record)
            .map_err(|err| PersistError::Record(StoreError::Serde(err)))?;
        record.id = self
            .documents
            .insert(IMAGES_COLLECTION, document)
            .await
            .map_err(PersistError::Record)?;
        Ok(record)
    }

    /// Persists each image independently. Individual failures are logged and
    /// skipped; the batch only fails when nothing was saved.
    pub async fn persist_batch(
        &self,
        data_uris: &[String],
        owner: &str,
        context: &PersistContext,
    ) -> Result<Vec<StoredImageRecord>, PersistError> {
        let mut saved = Vec::with_capacity(data_uris.len());
        for (index, data_uri) in data_uris.iter().enumerate() {
            match self.persist(data_uri, owner, context).await {
                Ok(record) => saved.push(record),
                Err(err) => tracing::warn!(index, owner, error = %err, "skipping image that failed to persist"),
            }
        }
        if saved.is_empty() && !data_uris.is_empty() {
            return Err(PersistError::NothingPersisted {
                attempted: data_uris.len(),
            });
        }
        Ok(saved)
    }

    /// Best-effort removal of the stored object behind a deleted record.
    pub async fn discard_object(&self, key: &str) {
        if key.is_empty() {
            return;
        }
        match self.objects.delete_object(key).await {
            Ok(true) => tracing::debug!(key, "stored object removed"),
            Ok(false) => tracing::debug!(key, "stored object already gone"),
            Err(err) => tracing::warn!(key, error = %err, "could not remove stored object"),
        }
    }

    async fn verify_upload(&self, key: &str, expected: &[u8]) -> Result<(), PersistError> {
        let stored = self
            .objects
            .get_object(key)
            .await
            .map_err(PersistError::Upload)?;
        match stored {
            Some(bytes) if sha256_hex(&bytes) == sha256_hex(expected) => Ok(()),
            _ => Err(PersistError::Integrity {
                key: key.to_string(),
            }),
        }
    }
}
