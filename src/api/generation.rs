use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};

use super::{AppState, BearerSubject};
use crate::error::{AppError, AppResult};
use crate::generation::prompt::known_styles;
use crate::generation::{GeneratedImage, GenerationPolicy, compose_style_prompt};
use crate::image_codec::{is_base64_payload, photo_payload};
use crate::persist::PersistContext;

pub const MAX_PHOTOS: usize = 10;
pub const MAX_IMAGES_PER_REQUEST: usize = 4;
pub const AUTO_FLOW_PHOTOS: usize = 2;
pub const AUTO_FLOW_IMAGES: usize = 2;
const AUTO_FLOW_TAG: &str = "auto";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub email: Option<String>,
    pub style: Option<String>,
    #[serde(default)]
    pub photos: Vec<String>,
    pub number_of_images: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateAutoRequest {
    pub email: Option<String>,
    pub post_text: Option<String>,
    #[serde(default)]
    pub photos: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    success: bool,
    message: String,
    image_urls: Vec<String>,
    prompt: String,
    style: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateAutoResponse {
    success: bool,
    message: String,
    image_urls: Vec<String>,
    prompt: String,
    optimized_prompt: String,
}

/// Requested image count, clamped to what one request may produce.
pub fn clamp_image_count(requested: Option<i64>) -> usize {
    requested.unwrap_or(1).clamp(1, MAX_IMAGES_PER_REQUEST as i64) as usize
}

fn photo_payloads(photos: &[String]) -> AppResult<Vec<String>> {
    photos
        .iter()
        .enumerate()
        .map(|(index, photo)| {
            let payload = photo_payload(photo.trim());
            if payload.is_empty() {
                Err(AppError::Validation(format!("photo {index} is empty")))
            } else if !is_base64_payload(payload) {
                Err(AppError::Validation(format!("photo {index} is not base64")))
            } else {
                Ok(payload.trim().to_string())
            }
        })
        .collect()
}

async fn persist_generated(
    state: &AppState,
    images: &[GeneratedImage],
    owner: &str,
    context: &PersistContext,
) -> AppResult<Vec<String>> {
    let data_uris: Vec<String> = images.iter().map(GeneratedImage::to_data_uri).collect();
    let records = state.persister.persist_batch(&data_uris, owner, context).await?;
    Ok(records.into_iter().map(|record| record.url).collect())
}

/// Style-keyed flow: fixed scene per style, images generated one by one.
pub async fn generate(
    State(state): State<AppState>,
    bearer: BearerSubject,
    Json(request): Json<GenerateRequest>,
) -> AppResult<Json<GenerateResponse>> {
    if request.photos.is_empty() || request.photos.len() > MAX_PHOTOS {
        return Err(AppError::Validation(format!(
            "between 1 and {MAX_PHOTOS} photos are required, got {}",
            request.photos.len()
        )));
    }
    let owner = bearer.owner(request.email.as_deref());
    let style = request.style.unwrap_or_default().trim().to_string();
    let count = clamp_image_count(request.number_of_images);
    let photos = photo_payloads(&request.photos)?;
    if !known_styles().any(|key| key.eq_ignore_ascii_case(&style)) {
        tracing::info!(style = %style, "unknown style, using the default portrait");
    }
    let prompt = compose_style_prompt(&style);
    tracing::info!(owner = %owner, style = %style, count, photos = photos.len(), "style generation requested");

    let policy = GenerationPolicy::Throttled(state.config.throttle.clone());
    let images = state
        .orchestrator
        .generate_images(&prompt, &photos, count, &policy)
        .await?;

    let context = PersistContext {
        prompt: prompt.clone(),
        style: style.clone(),
        photos_count: photos.len(),
    };
    let image_urls = persist_generated(&state, &images, &owner, &context).await?;

    Ok(Json(GenerateResponse {
        success: true,
        message: format!("{} of {count} images generated", image_urls.len()),
        image_urls,
        prompt,
        style,
    }))
}

/// Free-text flow: the post text is turned into a scene by the text model,
/// then two images are requested at once, falling back to one.
pub async fn generate_auto(
    State(state): State<AppState>,
    bearer: BearerSubject,
    Json(request): Json<GenerateAutoRequest>,
) -> AppResult<Json<GenerateAutoResponse>> {
    let post_text = request
        .post_text
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .ok_or_else(|| AppError::Validation("postText is required".to_string()))?;
    if request.photos.is_empty() {
        return Err(AppError::Validation("at least one photo is required".to_string()));
    }
    if request.photos.len() > AUTO_FLOW_PHOTOS {
        tracing::warn!(
            received = request.photos.len(),
            kept = AUTO_FLOW_PHOTOS,
            "extra photos ignored in auto flow"
        );
    }
    let owner = bearer.owner(request.email.as_deref());
    let kept = request.photos.len().min(AUTO_FLOW_PHOTOS);
    let photos = photo_payloads(&request.photos[..kept])?;

    let authored = state
        .composer
        .compose_from_post_text(&post_text, photos.len())
        .await?;

    let policy = GenerationPolicy::Parallel;
    let images = match state
        .orchestrator
        .generate_images(&authored.optimized, &photos, AUTO_FLOW_IMAGES, &policy)
        .await
    {
        Ok(images) => images,
        Err(err) => {
            tracing::warn!(owner = %owner, error = %err, "batch generation failed, retrying with a single image");
            state
                .orchestrator
                .generate_images(&authored.optimized, &photos, 1, &policy)
                .await?
        }
    };

    let context = PersistContext {
        prompt: authored.optimized.clone(),
        style: AUTO_FLOW_TAG.to_string(),
        photos_count: photos.len(),
    };
    let image_urls = persist_generated(&state, &images, &owner, &context).await?;

    Ok(Json(GenerateAutoResponse {
        success: true,
        message: format!("{} images generated", image_urls.len()),
        image_urls,
        prompt: authored.raw,
        optimized_prompt: authored.optimized,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_count_is_clamped() {
        assert_eq!(clamp_image_count(None), 1);
        assert_eq!(clamp_image_count(Some(0)), 1);
        assert_eq!(clamp_image_count(Some(-3)), 1);
        assert_eq!(clamp_image_count(Some(3)), 3);
        assert_eq!(clamp_image_count(Some(99)), 4);
    }

    #[test]
    fn payloads_strip_data_uri_headers() {
        let payloads =
            photo_payloads(&["data:image/png;base64,QUJD".to_string(), "REVG".to_string()]).unwrap();
        assert_eq!(payloads, vec!["QUJD".to_string(), "REVG".to_string()]);
        assert!(photo_payloads(&["  ".to_string()]).is_err());
    }

    #[test]
    fn payloads_must_be_base64() {
        let err = photo_payloads(&["QUJD".to_string(), "€".repeat(300_000)]).unwrap_err();
        assert!(matches!(err, AppError::Validation(message) if message.contains("photo 1")));
        assert!(photo_payloads(&["data:image/png;base64,@@@@".to_string()]).is_err());
    }
}
