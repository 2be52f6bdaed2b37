use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{
    Candidate, GenerationOptions, ImageProvider, Part, ProviderError, ProviderResponse,
    assert_ok_response,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    generation_config: GenerationConfig<'a>,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum RequestPart<'a> {
    #[serde(rename = "text")]
    Text(&'a str),
    InlineData(RequestInlineData<'a>),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestInlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    response_modalities: [&'static str; 2],
    #[serde(skip_serializing_if = "Option::is_none")]
    image_config: Option<ImageConfig<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageConfig<'a> {
    aspect_ratio: &'a str,
}

// Response shapes. The API has been seen returning both camelCase and
// snake_case keys, so every multi-word field carries an alias.

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<WireCandidate>,
    #[serde(alias = "prompt_feedback")]
    prompt_feedback: Option<PromptFeedback>,
    error: Option<WireError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCandidate {
    content: Option<WireContent>,
    #[serde(alias = "finish_reason")]
    finish_reason: Option<String>,
    #[serde(alias = "finish_message")]
    finish_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireContent {
    #[serde(default)]
    parts: Vec<WirePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePart {
    text: Option<String>,
    #[serde(alias = "inline_data")]
    inline_data: Option<WireInlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireInlineData {
    #[serde(alias = "mime_type")]
    mime_type: Option<String>,
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(alias = "block_reason")]
    block_reason: Option<String>,
    #[serde(alias = "block_reason_message")]
    block_reason_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireError {
    message: Option<String>,
}

/// Image generation through the Gemini `generateContent` endpoint.
pub struct GeminiImageProvider {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl GeminiImageProvider {
    pub fn new(client: Client, base_url: &str, model: &str, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl ImageProvider for GeminiImageProvider {
    async fn generate(
        &self,
        prompt: &str,
        reference_images: &[String],
        options: &GenerationOptions,
    ) -> Result<ProviderResponse, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(ProviderError::NotConfigured("GEMINI_API_KEY"))?;

        let body = build_request(prompt, reference_images, options);

        tracing::debug!(
            model = %self.model,
            prompt_len = prompt.len(),
            references = reference_images.len(),
            "sending gemini generateContent request"
        );
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await?;
        let response = assert_ok_response(response).await?;
        let text = response.text().await?;
        parse_response(&text)
    }
}

fn build_request<'a>(
    prompt: &'a str,
    reference_images: &'a [String],
    options: &'a GenerationOptions,
) -> GenerateContentRequest<'a> {
    let mut parts = Vec::with_capacity(reference_images.len() + 1);
    parts.push(RequestPart::Text(prompt));
    for image in reference_images {
        parts.push(RequestPart::InlineData(RequestInlineData {
            mime_type: &options.reference_mime_type,
            data: image,
        }));
    }
    GenerateContentRequest {
        contents: vec![RequestContent { role: "user", parts }],
        generation_config: GenerationConfig {
            response_modalities: ["IMAGE", "TEXT"],
            image_config: options
                .aspect_ratio
                .as_deref()
                .map(|aspect_ratio| ImageConfig { aspect_ratio }),
        },
    }
}

fn parse_response(raw: &str) -> Result<ProviderResponse, ProviderError> {
    let payload: GenerateContentResponse = serde_json::from_str(raw)
        .map_err(|err| ProviderError::Decode(format!("{err}; body starts with: {}", preview(raw))))?;
    Ok(normalize(payload))
}

fn normalize(payload: GenerateContentResponse) -> ProviderResponse {
    let mut message = payload.error.and_then(|err| err.message);
    if message.is_none() {
        message = payload.prompt_feedback.and_then(|feedback| {
            match (feedback.block_reason, feedback.block_reason_message) {
                (Some(reason), Some(detail)) => Some(format!("{reason}: {detail}")),
                (Some(reason), None) => Some(format!("prompt blocked: {reason}")),
                (None, detail) => detail,
            }
        });
    }

    let mut candidates = Vec::with_capacity(payload.candidates.len());
    for candidate in payload.candidates {
        if message.is_none() {
            message = candidate.finish_message.clone();
        }
        let parts = candidate
            .content
            .map(|content| content.parts)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|part| {
                if let Some(inline) = part.inline_data {
                    let data = inline.data.filter(|data| !data.is_empty())?;
                    return Some(Part::InlineImage {
                        mime_type: inline.mime_type.unwrap_or_else(|| "image/png".to_string()),
                        data,
                    });
                }
                part.text.map(Part::Text)
            })
            .collect();
        candidates.push(Candidate {
            finish_reason: candidate.finish_reason,
            parts,
        });
    }
    ProviderResponse { candidates, message }
}

fn preview(raw: &str) -> String {
    raw.chars().take(200).collect()
}
