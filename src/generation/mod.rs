pub mod client;
pub mod orchestrator;
pub mod prompt;

use serde::{Deserialize, Serialize};

use crate::image_codec::to_data_uri;
use crate::providers::ProviderError;

pub use client::{ImageGeneratorClient, extract_first_image};
pub use orchestrator::{GenerationPolicy, Orchestrator};
pub use prompt::{AuthoredPrompt, PromptComposer, compose_style_prompt};

/// An image as returned by the provider, still inline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedImage {
    pub mime_type: String,
    /// Base64 payload.
    pub data: String,
}

impl GeneratedImage {
    pub fn to_data_uri(&self) -> String {
        to_data_uri(&self.mime_type, &self.data)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("generation blocked by provider (finish reason {reason})")]
    Blocked { reason: String },

    #[error("no image in provider response{}", .0.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    NoImage(Option<String>),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("no images were generated")]
    NothingGenerated,
}

#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("text provider returned no prompt")]
    Empty,
}
