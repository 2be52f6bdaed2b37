//! Clients for the upstream AI providers.
//!
//! Each client maps its wire format onto the small set of types below so the
//! generation layer never looks at provider JSON.

pub mod gemini;
pub mod openai;

use async_trait::async_trait;

pub use gemini::GeminiImageProvider;
pub use openai::OpenAiTextProvider;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider not configured: {0}")]
    NotConfigured(&'static str),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unreadable provider response: {0}")]
    Decode(String),

    #[error("provider error: {0}")]
    Api(String),
}

/// Knobs forwarded with each image request.
#[derive(Clone, Debug)]
pub struct GenerationOptions {
    /// Mime type assumed for every inlined reference photo.
    pub reference_mime_type: String,
    /// Square unless overridden.
    pub aspect_ratio: Option<String>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            reference_mime_type: "image/jpeg".to_string(),
            aspect_ratio: Some("1:1".to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Part {
    InlineImage { mime_type: String, data: String },
    Text(String),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Candidate {
    pub finish_reason: Option<String>,
    pub parts: Vec<Part>,
}

/// Provider output after normalization.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProviderResponse {
    pub candidates: Vec<Candidate>,
    /// Explanatory text the provider attached (block reason, error message).
    pub message: Option<String>,
}

#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// One request: the prompt followed by every reference image inline.
    async fn generate(
        &self,
        prompt: &str,
        reference_images: &[String],
        options: &GenerationOptions,
    ) -> Result<ProviderResponse, ProviderError>;
}

#[async_trait]
pub trait TextCompletionProvider: Send + Sync {
    /// Content of the first completion choice, if any.
    async fn complete(&self, system: &str, user: &str) -> Result<Option<String>, ProviderError>;
}

pub(crate) async fn assert_ok_response(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Status { status, body })
}
