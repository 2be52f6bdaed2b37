use std::sync::Arc;

use futures_util::future::try_join_all;
use tokio::time::sleep;

use super::{GeneratedImage, GenerationError, ImageGeneratorClient};
use crate::config::ThrottleConfig;
use crate::image_codec::shrink_photo;
use crate::retry::RetryPolicy;

#[derive(Clone, Debug)]
pub enum GenerationPolicy {
    /// All images requested at once; the first failure fails the batch.
    Parallel,
    /// One image at a time with pacing. Failed images are skipped; the batch
    /// fails only when none succeeded.
    Throttled(ThrottleConfig),
}

/// Drives several single-image generations for one request.
#[derive(Clone)]
pub struct Orchestrator {
    client: Arc<ImageGeneratorClient>,
    parallel_retry: RetryPolicy,
}

impl Orchestrator {
    /// The throttled policy retries with the client's own policy; parallel
    /// batches retry at once.
    pub fn new(client: Arc<ImageGeneratorClient>) -> Self {
        Self {
            client,
            parallel_retry: RetryPolicy::immediate(),
        }
    }

    /// `photos` are base64 payloads. The result keeps request order and is
    /// never empty.
    pub async fn generate_images(
        &self,
        prompt: &str,
        photos: &[String],
        count: usize,
        policy: &GenerationPolicy,
    ) -> Result<Vec<GeneratedImage>, GenerationError> {
        let images = match policy {
            GenerationPolicy::Parallel => self.generate_parallel(prompt, photos, count).await?,
            GenerationPolicy::Throttled(throttle) => {
                self.generate_throttled(prompt, photos, count, throttle).await?
            }
        };
        if images.is_empty() {
            return Err(GenerationError::NothingGenerated);
        }
        Ok(images)
    }

    async fn generate_parallel(
        &self,
        prompt: &str,
        photos: &[String],
        count: usize,
    ) -> Result<Vec<GeneratedImage>, GenerationError> {
        tracing::info!(count, photos = photos.len(), "generating images in parallel");
        let jobs = (0..count)
            .map(|_| self.client.generate_with_retry(prompt, photos, &self.parallel_retry));
        try_join_all(jobs).await
    }

    async fn generate_throttled(
        &self,
        prompt: &str,
        photos: &[String],
        count: usize,
        throttle: &ThrottleConfig,
    ) -> Result<Vec<GeneratedImage>, GenerationError> {
        let mut references: Vec<String> = photos
            .iter()
            .map(|photo| shrink_photo(photo, throttle.photo_budget_kb))
            .collect();
        if let Some(max) = throttle.max_photos_to_send {
            references.truncate(max);
        }
        tracing::info!(
            count,
            photos = photos.len(),
            sent = references.len(),
            "generating images sequentially"
        );

        let mut images = Vec::with_capacity(count);
        let mut last_error = None;
        for index in 0..count {
            match self.client.generate_one_image(prompt, &references).await {
                Ok(image) => {
                    images.push(image);
                    tracing::info!(index, generated = images.len(), count, "image ready");
                    if index + 1 < count && !throttle.inter_image_delay.is_zero() {
                        sleep(throttle.inter_image_delay).await;
                    }
                }
                Err(err) => {
                    tracing::warn!(index, error = %err, "skipping failed image");
                    last_error = Some(err);
                }
            }
        }
        if images.is_empty() {
            if let Some(err) = last_error {
                tracing::error!(count, error = %err, "no image generated");
                return Err(err);
            }
        }
        Ok(images)
    }
}
