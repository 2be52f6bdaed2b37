use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{ProviderError, TextCompletionProvider, assert_ok_response};

const MAX_COMPLETION_TOKENS: u32 = 500;
const TEMPERATURE: f32 = 0.7;

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Option<Vec<ChatChoice>>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: Option<String>,
}

/// Chat-completion client used to author prompts.
pub struct OpenAiTextProvider {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiTextProvider {
    pub fn new(client: Client, base_url: &str, model: &str, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
        }
    }
}

#[async_trait]
impl TextCompletionProvider for OpenAiTextProvider {
    async fn complete(&self, system: &str, user: &str) -> Result<Option<String>, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(ProviderError::NotConfigured("OPENAI_API_KEY"))?;
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&json!({
                "model": self.model,
                "messages": [
                    {"role": "system", "content": system},
                    {"role": "user", "content": user}
                ],
                "max_tokens": MAX_COMPLETION_TOKENS,
                "temperature": TEMPERATURE,
            }))
            .send()
            .await?;

        let response = assert_ok_response(response).await?;
        let payload: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|err| ProviderError::Decode(err.to_string()))?;
        first_choice_content(payload)
    }
}

fn first_choice_content(payload: ChatCompletionResponse) -> Result<Option<String>, ProviderError> {
    if let Some(error) = payload.error.and_then(|err| err.message) {
        return Err(ProviderError::Api(error));
    }
    Ok(payload
        .choices
        .and_then(|choices| choices.into_iter().next())
        .and_then(|choice| choice.message)
        .and_then(|msg| msg.content))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Result<Option<String>, ProviderError> {
        first_choice_content(serde_json::from_str(raw).unwrap())
    }

    #[test]
    fn takes_first_choice() {
        let raw = r#"{"choices":[{"message":{"content":"first"}},{"message":{"content":"second"}}]}"#;
        assert_eq!(parse(raw).unwrap().as_deref(), Some("first"));
    }

    #[test]
    fn missing_content_is_none() {
        assert_eq!(parse(r#"{"choices":[]}"#).unwrap(), None);
        assert_eq!(parse(r#"{"choices":[{"message":{}}]}"#).unwrap(), None);
    }

    #[test]
    fn api_error_surfaces() {
        let err = parse(r#"{"error":{"message":"quota exceeded"}}"#).unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));
    }
}
