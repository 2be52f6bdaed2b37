use std::sync::Arc;

use tokio::time::sleep;

use super::{GeneratedImage, GenerationError};
use crate::image_codec::parse_data_uri;
use crate::providers::{GenerationOptions, ImageProvider, Part, ProviderResponse};
use crate::retry::RetryPolicy;

/// Finish reasons that mean the provider refused to produce output.
const BLOCKING_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "RECITATION",
    "OTHER",
    "BLOCKLIST",
    "PROHIBITED_CONTENT",
    "SPII",
    "IMAGE_SAFETY",
];

/// Single-image generation with bounded retry.
pub struct ImageGeneratorClient {
    provider: Arc<dyn ImageProvider>,
    retry: RetryPolicy,
    options: GenerationOptions,
}

impl ImageGeneratorClient {
    pub fn new(provider: Arc<dyn ImageProvider>, retry: RetryPolicy) -> Self {
        Self {
            provider,
            retry,
            options: GenerationOptions::default(),
        }
    }

    /// Generates one image. Each failed attempt is logged and retried; only the
    /// last attempt's error is returned.
    pub async fn generate_one_image(
        &self,
        prompt: &str,
        reference_images: &[String],
    ) -> Result<GeneratedImage, GenerationError> {
        self.generate_with_retry(prompt, reference_images, &self.retry)
            .await
    }

    /// Same as [`generate_one_image`](Self::generate_one_image) under a
    /// caller-chosen retry policy.
    pub async fn generate_with_retry(
        &self,
        prompt: &str,
        reference_images: &[String],
        retry: &RetryPolicy,
    ) -> Result<GeneratedImage, GenerationError> {
        let max_attempts = retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let delay = retry.delay_for_attempt(attempt);
            if !delay.is_zero() {
                tracing::info!(attempt, delay_ms = delay.as_millis() as u64, "waiting before retry");
                sleep(delay).await;
            }

            match self.attempt(prompt, reference_images).await {
                Ok(image) => {
                    tracing::debug!(attempt, mime_type = %image.mime_type, "image generated");
                    return Ok(image);
                }
                Err(err) if attempt < max_attempts => {
                    tracing::warn!(attempt, max_attempts, error = %err, "image generation attempt failed");
                    attempt += 1;
                }
                Err(err) => {
                    tracing::error!(attempt, error = %err, "image generation failed after retries");
                    return Err(err);
                }
            }
        }
    }

    async fn attempt(
        &self,
        prompt: &str,
        reference_images: &[String],
    ) -> Result<GeneratedImage, GenerationError> {
        let response = self
            .provider
            .generate(prompt, reference_images, &self.options)
            .await?;
        extract_first_image(&response)
    }
}

/// Walks candidates in order and returns the first image found.
///
/// A candidate with a blocking finish reason fails the whole response, even
/// when a later candidate carries an image. Inside a candidate the first
/// inline image, or text part holding an image data URI, wins.
pub fn extract_first_image(response: &ProviderResponse) -> Result<GeneratedImage, GenerationError> {
    let mut texts = Vec::new();
    for candidate in &response.candidates {
        if let Some(reason) = candidate.finish_reason.as_deref() {
            if BLOCKING_FINISH_REASONS.contains(&reason) {
                return Err(GenerationError::Blocked {
                    reason: reason.to_string(),
                });
            }
        }
        for part in &candidate.parts {
            match part {
                Part::InlineImage { mime_type, data } => {
                    return Ok(GeneratedImage {
                        mime_type: mime_type.clone(),
                        data: data.clone(),
                    });
                }
                Part::Text(text) => {
                    let trimmed = text.trim();
                    if trimmed.starts_with("data:image/") {
                        if let Ok(uri) = parse_data_uri(trimmed) {
                            return Ok(GeneratedImage {
                                mime_type: uri.mime_type,
                                data: uri.payload,
                            });
                        }
                    }
                    if !trimmed.is_empty() {
                        texts.push(trimmed.to_string());
                    }
                }
            }
        }
    }

    let detail = response
        .message
        .clone()
        .or_else(|| (!texts.is_empty()).then(|| texts.join(" ")));
    Err(GenerationError::NoImage(detail))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::providers::{Candidate, ProviderError};

    fn image_part(data: &str) -> Part {
        Part::InlineImage {
            mime_type: "image/png".into(),
            data: data.into(),
        }
    }

    fn response(candidates: Vec<Candidate>) -> ProviderResponse {
        ProviderResponse {
            candidates,
            message: None,
        }
    }

    #[test]
    fn first_inline_image_wins() {
        let resp = response(vec![
            Candidate {
                finish_reason: Some("STOP".into()),
                parts: vec![Part::Text("here you go".into()), image_part("AAA1"), image_part("AAA2")],
            },
            Candidate {
                finish_reason: None,
                parts: vec![image_part("BBB1")],
            },
        ]);
        assert_eq!(extract_first_image(&resp).unwrap().data, "AAA1");
    }

    #[test]
    fn data_uri_text_part_counts_as_image() {
        let resp = response(vec![Candidate {
            finish_reason: None,
            parts: vec![Part::Text("data:image/jpeg;base64,QUJD".into()), image_part("later")],
        }]);
        let image = extract_first_image(&resp).unwrap();
        assert_eq!(image.mime_type, "image/jpeg");
        assert_eq!(image.data, "QUJD");
    }

    #[test]
    fn blocked_candidate_is_a_hard_error() {
        let resp = response(vec![
            Candidate {
                finish_reason: Some("SAFETY".into()),
                parts: vec![],
            },
            Candidate {
                finish_reason: Some("STOP".into()),
                parts: vec![image_part("AAAA")],
            },
        ]);
        assert!(matches!(
            extract_first_image(&resp),
            Err(GenerationError::Blocked { reason }) if reason == "SAFETY"
        ));
    }

    #[test]
    fn no_image_embeds_provider_text() {
        let resp = response(vec![Candidate {
            finish_reason: Some("STOP".into()),
            parts: vec![Part::Text("I can only describe the photo".into())],
        }]);
        let err = extract_first_image(&resp).unwrap_err();
        assert!(err.to_string().contains("I can only describe the photo"));

        let with_message = ProviderResponse {
            candidates: vec![],
            message: Some("prompt blocked: OTHER".into()),
        };
        let err = extract_first_image(&with_message).unwrap_err();
        assert!(err.to_string().contains("prompt blocked: OTHER"));
    }

    struct ScriptedProvider {
        calls: AtomicUsize,
        script: Mutex<Vec<Result<ProviderResponse, ProviderError>>>,
    }

    #[async_trait]
    impl ImageProvider for ScriptedProvider {
        async fn generate(
            &self,
            _prompt: &str,
            _reference_images: &[String],
            _options: &GenerationOptions,
        ) -> Result<ProviderResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script.lock().unwrap().remove(0)
        }
    }

    fn ok_image(data: &str) -> Result<ProviderResponse, ProviderError> {
        Ok(response(vec![Candidate {
            finish_reason: Some("STOP".into()),
            parts: vec![image_part(data)],
        }]))
    }

    #[tokio::test]
    async fn retries_once_then_succeeds() {
        let provider = Arc::new(ScriptedProvider {
            calls: AtomicUsize::new(0),
            script: Mutex::new(vec![Err(ProviderError::Api("busy".into())), ok_image("OK==")]),
        });
        let client = ImageGeneratorClient::new(provider.clone(), RetryPolicy::immediate());
        let image = client.generate_one_image("p", &[]).await.unwrap();
        assert_eq!(image.data, "OK==");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn last_error_propagates_after_exhaustion() {
        let provider = Arc::new(ScriptedProvider {
            calls: AtomicUsize::new(0),
            script: Mutex::new(vec![
                Err(ProviderError::Api("first".into())),
                Ok(response(vec![])),
                ok_image("never"),
            ]),
        });
        let client = ImageGeneratorClient::new(provider.clone(), RetryPolicy::immediate());
        let err = client.generate_one_image("p", &[]).await.unwrap_err();
        assert!(matches!(err, GenerationError::NoImage(None)));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }
}
