use std::cmp::Reverse;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::storage::{
    Document, DocumentStore, IMAGES_COLLECTION, OWNER_FIELD, StoreError, StoredImageRecord,
};

/// Shortest url a stored record may carry.
pub const MIN_URL_LEN: usize = 12;
const ACCEPTED_URL_PREFIXES: &[&str] = &["https://", "http://"];

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryListing {
    pub images: Vec<StoredImageRecord>,
    pub omitted_count: usize,
}

/// Whether a stored url follows the object-storage convention. Inline
/// `data:` payloads and truncated leftovers from older records fail.
pub fn is_servable_url(url: &str) -> bool {
    url.len() >= MIN_URL_LEN && ACCEPTED_URL_PREFIXES.iter().any(|prefix| url.starts_with(prefix))
}

#[derive(Clone)]
pub struct GalleryReader {
    documents: Arc<dyn DocumentStore>,
}

impl GalleryReader {
    pub fn new(documents: Arc<dyn DocumentStore>) -> Self {
        Self { documents }
    }

    pub async fn list_gallery(&self, owner: &str) -> Result<GalleryListing, StoreError> {
        let documents = self
            .documents
            .find_eq(IMAGES_COLLECTION, OWNER_FIELD, owner)
            .await?;
        let listing = build_listing(documents);
        if listing.omitted_count > 0 {
            tracing::warn!(
                owner,
                omitted = listing.omitted_count,
                returned = listing.images.len(),
                "omitting corrupt gallery records"
            );
        }
        Ok(listing)
    }

    pub async fn raw_documents(&self, owner: &str) -> Result<Vec<Document>, StoreError> {
        self.documents
            .find_eq(IMAGES_COLLECTION, OWNER_FIELD, owner)
            .await
    }
}

fn build_listing(documents: Vec<Document>) -> GalleryListing {
    let now = Utc::now();
    let mut omitted_count = 0;
    let mut images = Vec::with_capacity(documents.len());
    for document in documents {
        let record = match serde_json::from_value::<StoredImageRecord>(document.data) {
            Ok(record) if is_servable_url(&record.url) => record,
            _ => {
                omitted_count += 1;
                continue;
            }
        };
        images.push(StoredImageRecord {
            id: document.id,
            ..record
        });
    }
    // unparsable timestamps sort as "now"
    images.sort_by_cached_key(|record| {
        Reverse(
            DateTime::parse_from_rfc3339(&record.created_at)
                .map(|at| at.with_timezone(&Utc))
                .unwrap_or(now),
        )
    });
    GalleryListing {
        images,
        omitted_count,
    }
}
