use axum::{
    Json,
    extract::{Path, State},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{AppState, BearerSubject, owner_identity};
use crate::error::{AppError, AppResult};
use crate::storage::{
    IMAGES_COLLECTION, SELECTIONS_COLLECTION, SelectionRecord, StoreError, StoredImageRecord,
};

/// Selection urls are cut past this many bytes to stay under the document
/// size limit.
pub const SELECTION_URL_MAX_BYTES: usize = 900_000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionRequest {
    pub email: Option<String>,
    pub image_url: Option<String>,
    #[serde(default)]
    pub prompt: String,
    pub flow_type: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionResponse {
    success: bool,
    message: String,
    id: String,
    url_truncated: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryResponse {
    success: bool,
    message: String,
    images: Vec<StoredImageRecord>,
    omitted_count: usize,
}

#[derive(Debug, Serialize)]
pub struct DeleteImageResponse {
    success: bool,
    message: String,
}

#[derive(Debug, Serialize)]
pub struct RawDocument {
    id: String,
    data: Value,
}

#[derive(Debug, Serialize)]
pub struct DebugDumpResponse {
    success: bool,
    message: String,
    owner: String,
    count: usize,
    documents: Vec<RawDocument>,
}

/// Cuts `url` to at most `max_bytes`, on a char boundary.
pub fn truncate_url(url: &str, max_bytes: usize) -> (&str, bool) {
    if url.len() <= max_bytes {
        return (url, false);
    }
    let mut cut = max_bytes;
    while !url.is_char_boundary(cut) {
        cut -= 1;
    }
    (&url[..cut], true)
}

pub async fn save_selection(
    State(state): State<AppState>,
    bearer: BearerSubject,
    Json(request): Json<SelectionRequest>,
) -> AppResult<Json<SelectionResponse>> {
    let image_url = request
        .image_url
        .filter(|url| !url.trim().is_empty())
        .ok_or_else(|| AppError::Validation("imageUrl is required".to_string()))?;
    let owner = bearer.owner(request.email.as_deref());
    let (stored_url, url_truncated) = truncate_url(&image_url, SELECTION_URL_MAX_BYTES);
    if url_truncated {
        tracing::warn!(owner = %owner, original = image_url.len(), "selection url truncated");
    }

    let record = SelectionRecord {
        owner: owner.clone(),
        image_url: stored_url.to_string(),
        url_truncated,
        prompt: request.prompt,
        flow_type: request.flow_type.unwrap_or_else(|| "unknown".to_string()),
        saved_at: Utc::now().to_rfc3339(),
    };
    let data = serde_json::to_value(&record).map_err(|err| AppError::Internal(err.into()))?;
    let id = state.documents.insert(SELECTIONS_COLLECTION, data).await?;
    tracing::info!(owner = %owner, id = %id, flow = %record.flow_type, "selection saved");

    Ok(Json(SelectionResponse {
        success: true,
        message: "selection saved".to_string(),
        id,
        url_truncated,
    }))
}

pub async fn list_gallery(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> AppResult<Json<GalleryResponse>> {
    let owner = owner_identity(Some(&email));
    let listing = state.gallery.list_gallery(&owner).await?;
    Ok(Json(GalleryResponse {
        success: true,
        message: format!("{} images", listing.images.len()),
        images: listing.images,
        omitted_count: listing.omitted_count,
    }))
}

pub async fn delete_image(
    State(state): State<AppState>,
    Path(image_id): Path<String>,
) -> AppResult<Json<DeleteImageResponse>> {
    let image_id = image_id.trim();
    let document = state
        .documents
        .get(IMAGES_COLLECTION, image_id)
        .await
        .map_err(|err| match err {
            StoreError::InvalidKey(key) => AppError::Validation(format!("invalid image id '{key}'")),
            other => other.into(),
        })?
        .ok_or_else(|| AppError::NotFound(format!("image {image_id} not found")))?;

    if !state.documents.delete(IMAGES_COLLECTION, image_id).await? {
        return Err(AppError::NotFound(format!("image {image_id} not found")));
    }
    state.persister.discard_object(storage_key(&document.data)).await;
    tracing::info!(image_id, "image deleted");
    Ok(Json(DeleteImageResponse {
        success: true,
        message: "image deleted".to_string(),
    }))
}

/// Object key recorded next to an image, empty for legacy records.
pub(super) fn storage_key(data: &Value) -> &str {
    data.get("storageKey").and_then(Value::as_str).unwrap_or_default()
}

pub async fn debug_dump(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> AppResult<Json<DebugDumpResponse>> {
    let owner = owner_identity(Some(&email));
    let documents: Vec<RawDocument> = state
        .gallery
        .raw_documents(&owner)
        .await?
        .into_iter()
        .map(|document| RawDocument {
            id: document.id,
            data: document.data,
        })
        .collect();
    Ok(Json(DebugDumpResponse {
        success: true,
        message: "raw image documents".to_string(),
        count: documents.len(),
        owner,
        documents,
    }))
}
