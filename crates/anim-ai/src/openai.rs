use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::{ChatMessage, CompletionModel, CompletionRequest, ProviderError};

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Chat-completions client for OpenAI-compatible endpoints. Performs exactly
/// one round-trip per call and always requests a JSON-only completion.
pub struct OpenAiModel {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl fmt::Debug for OpenAiModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiModel")
            .field("api_key", &"<REDACTED>")
            .field("api_key_len", &self.api_key.len())
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl OpenAiModel {
    pub fn new(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|error| ProviderError::Network(error.to_string()))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    response_format: ResponseFormat,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format: &'static str,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireAssistantMessage,
}

#[derive(Debug, Deserialize)]
struct WireAssistantMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireErrorBody {
    error: WireErrorDetail,
}

#[derive(Debug, Deserialize)]
struct WireErrorDetail {
    message: String,
}

fn wire_messages(messages: &[ChatMessage]) -> Vec<WireMessage<'_>> {
    messages
        .iter()
        .map(|message| WireMessage {
            role: message.role.as_str(),
            content: &message.content,
        })
        .collect()
}

#[async_trait]
impl CompletionModel for OpenAiModel {
    async fn complete(&self, request: CompletionRequest) -> Result<String, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::MissingCredential);
        }

        let url = format!("{}/chat/completions", self.base_url);
        let body = WireRequest {
            model: &self.model,
            messages: wire_messages(&request.messages),
            response_format: ResponseFormat {
                format: "json_object",
            },
            temperature: request.temperature,
        };

        tracing::debug!(
            model = %self.model,
            temperature = request.temperature,
            message_count = request.messages.len(),
            "requesting completion"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|error| ProviderError::Network(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<WireErrorBody>(&raw)
                .map(|body| body.error.message)
                .unwrap_or(raw);
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: WireResponse = response
            .json()
            .await
            .map_err(|error| ProviderError::MalformedResponse(error.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                ProviderError::MalformedResponse("completion had no choices".to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ResponseFormat, WireRequest, wire_messages};
    use crate::ChatMessage;

    #[test]
    fn wire_request_serializes_to_the_chat_completions_shape() {
        let messages = vec![
            ChatMessage::system("system instructions"),
            ChatMessage::user("a rotating red sphere"),
        ];
        let request = WireRequest {
            model: "gpt-4o-mini",
            messages: wire_messages(&messages),
            response_format: ResponseFormat {
                format: "json_object",
            },
            temperature: 0.7,
        };

        let encoded = serde_json::to_value(&request).expect("request should serialize");
        assert_eq!(
            encoded,
            json!({
                "model": "gpt-4o-mini",
                "messages": [
                    {"role": "system", "content": "system instructions"},
                    {"role": "user", "content": "a rotating red sphere"}
                ],
                "response_format": {"type": "json_object"},
                "temperature": 0.7
            })
        );
    }
}
