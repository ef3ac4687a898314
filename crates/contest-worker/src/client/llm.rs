//! Generative-text providers.
//!
//! Both supported providers speak the chat-completions protocol; they differ
//! in whether a message may carry an image part.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use refund_contest_engine::{DefenseGenerator, GenerationError};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::prompt;

/// Provider selected at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    DeepSeek,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::DeepSeek => "deepseek",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-4o-mini",
            Self::DeepSeek => "deepseek-chat",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::DeepSeek => "https://api.deepseek.com/v1",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown LLM provider '{0}' (expected 'openai' or 'deepseek')")]
pub struct UnknownProvider(pub String);

impl FromStr for ProviderKind {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "deepseek" => Ok(Self::DeepSeek),
            _ => Err(UnknownProvider(s.trim().to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user(content: MessageContent) -> Self {
        Self {
            role: "user".to_string(),
            content,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat-completions HTTP adapter shared by both providers.
#[derive(Clone)]
pub struct ChatCompletionsClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl ChatCompletionsClient {
    pub fn new(base_url: &str, api_key: &str, model: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            timeout,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send one conversation and return the first completion's text.
    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<String, GenerationError> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature: 0.4,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        match response.status() {
            status if status.is_success() => {
                let body: ChatResponse = response
                    .json()
                    .await
                    .map_err(|e| GenerationError::Parse(e.to_string()))?;

                body.choices
                    .into_iter()
                    .next()
                    .and_then(|choice| choice.message.content)
                    .map(|text| text.trim().to_string())
                    .filter(|text| !text.is_empty())
                    .ok_or(GenerationError::EmptyResponse)
            }
            StatusCode::TOO_MANY_REQUESTS => {
                let body = response.text().await.unwrap_or_default();
                Err(GenerationError::Quota(body))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(GenerationError::Provider(format!("{}: {}", status.as_u16(), body)))
            }
        }
    }

    fn map_transport_error(&self, err: reqwest::Error) -> GenerationError {
        if err.is_timeout() {
            GenerationError::Timeout(self.timeout.as_secs())
        } else {
            GenerationError::Http(err.to_string())
        }
    }
}

/// Defense strategy chosen from the configured provider.
#[derive(Clone)]
pub enum LlmGenerator {
    /// Sends the evidence image alongside the text when one exists.
    Multimodal(ChatCompletionsClient),
    /// Text only; the image is mentioned but never sent.
    TextOnly(ChatCompletionsClient),
}

impl LlmGenerator {
    pub fn for_provider(provider: ProviderKind, client: ChatCompletionsClient) -> Self {
        match provider {
            ProviderKind::OpenAi => Self::Multimodal(client),
            ProviderKind::DeepSeek => Self::TextOnly(client),
        }
    }

    fn client(&self) -> &ChatCompletionsClient {
        match self {
            Self::Multimodal(client) | Self::TextOnly(client) => client,
        }
    }

    /// Build the conversation for one order.
    pub fn messages(&self, reason: &str, items: &str, image_ref: Option<&str>) -> Vec<ChatMessage> {
        let system = ChatMessage::system(prompt::SYSTEM_PROMPT);

        let user = match (self, image_ref) {
            (Self::Multimodal(_), Some(url)) => MessageContent::Parts(vec![
                ContentPart::Text {
                    text: prompt::user_prompt(reason, items, prompt::ImageNote::Attached),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: url.to_string(),
                    },
                },
            ]),
            (Self::TextOnly(_), Some(_)) => MessageContent::Text(prompt::user_prompt(
                reason,
                items,
                prompt::ImageNote::NotViewable,
            )),
            (_, None) => {
                MessageContent::Text(prompt::user_prompt(reason, items, prompt::ImageNote::None))
            }
        };

        vec![system, ChatMessage::user(user)]
    }
}

#[async_trait]
impl DefenseGenerator for LlmGenerator {
    fn name(&self) -> &'static str {
        match self {
            Self::Multimodal(_) => "multimodal",
            Self::TextOnly(_) => "text",
        }
    }

    async fn generate(
        &self,
        reason: &str,
        items: &str,
        image_ref: Option<&str>,
    ) -> Result<String, GenerationError> {
        let messages = self.messages(reason, items, image_ref);
        tracing::debug!(
            strategy = self.name(),
            model = self.client().model(),
            with_image = matches!(self, Self::Multimodal(_)) && image_ref.is_some(),
            "Requesting defense text"
        );
        self.client().complete(&messages).await
    }
}
