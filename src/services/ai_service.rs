use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AppError;
use crate::services::prompt_service::PlanRequest;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const TEMPERATURE: f32 = 0.1;
const MAX_TOKENS: u32 = 4096;

/// The model that turns a [`PlanRequest`] into free text expected to hold a plan.
pub trait PlanModel: Send + Sync {
    fn complete(
        &self,
        request: &PlanRequest,
    ) -> impl Future<Output = Result<String, AppError>> + Send;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiProvider {
    #[default]
    Claude,
    #[serde(rename = "openai")]
    OpenAi,
    Kimi,
    Glm,
    #[serde(rename = "openrouter")]
    OpenRouter,
}

impl AiProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::OpenAi => "openai",
            Self::Kimi => "kimi",
            Self::Glm => "glm",
            Self::OpenRouter => "openrouter",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "claude" | "anthropic" => Some(Self::Claude),
            "openai" => Some(Self::OpenAi),
            "kimi" | "moonshot" => Some(Self::Kimi),
            "glm" | "zhipu" => Some(Self::Glm),
            "openrouter" => Some(Self::OpenRouter),
            _ => None,
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            Self::Claude => "claude-3-5-sonnet-20241022",
            Self::OpenAi => "gpt-4-turbo-preview",
            Self::Kimi => "moonshot-v1-8k",
            Self::Glm => "glm-4",
            Self::OpenRouter => "anthropic/claude-3.5-sonnet",
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::Claude => ANTHROPIC_API_URL,
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Kimi => "https://api.moonshot.cn/v1",
            Self::Glm => "https://open.bigmodel.cn/api/paas/v4",
            Self::OpenRouter => "https://openrouter.ai/api/v1",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiSettings {
    pub provider: AiProvider,
    pub model: Option<String>,
    pub base_url: Option<String>,
}

impl AiSettings {
    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }

    pub fn endpoint(&self) -> String {
        let base = self
            .base_url
            .as_deref()
            .unwrap_or_else(|| self.provider.default_base_url())
            .trim_end_matches('/');
        match self.provider {
            AiProvider::Claude => base.to_string(),
            _ => format!("{base}/chat/completions"),
        }
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct AnthropicBody<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicBlock>,
}

#[derive(Deserialize)]
struct AnthropicBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

fn anthropic_body<'a>(model: &'a str, request: &'a PlanRequest) -> AnthropicBody<'a> {
    AnthropicBody {
        model,
        max_tokens: MAX_TOKENS,
        temperature: TEMPERATURE,
        system: &request.system,
        messages: vec![ChatMessage {
            role: "user",
            content: &request.user,
        }],
    }
}

fn chat_completion_body<'a>(model: &'a str, request: &'a PlanRequest) -> ChatCompletionBody<'a> {
    ChatCompletionBody {
        model,
        max_tokens: MAX_TOKENS,
        temperature: TEMPERATURE,
        messages: vec![
            ChatMessage {
                role: "system",
                content: &request.system,
            },
            ChatMessage {
                role: "user",
                content: &request.user,
            },
        ],
    }
}

fn anthropic_text(response: AnthropicResponse) -> Result<String, AppError> {
    let text = response
        .content
        .into_iter()
        .filter(|block| block.kind == "text")
        .filter_map(|block| block.text)
        .collect::<Vec<_>>()
        .join("");
    if text.is_empty() {
        return Err(AppError::General("Model returned no text content".to_string()));
    }
    Ok(text)
}

fn chat_completion_text(response: ChatCompletionResponse) -> Result<String, AppError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|text| !text.is_empty())
        .ok_or_else(|| AppError::General("Model returned no text content".to_string()))
}

/// Talks to a hosted model over HTTPS.
pub struct HttpPlanModel {
    client: reqwest::Client,
    settings: AiSettings,
    api_key: String,
}

impl HttpPlanModel {
    pub fn new(settings: AiSettings, api_key: String, timeout: Duration) -> Result<Self, AppError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            settings,
            api_key,
        })
    }

    async fn send(&self, request: &PlanRequest) -> Result<String, AppError> {
        if self.api_key.trim().is_empty() {
            return Err(AppError::General("No API key configured".to_string()));
        }
        let model = self.settings.model();
        let endpoint = self.settings.endpoint();
        debug!(provider = self.settings.provider.as_str(), model, "sending plan request");

        let builder = match self.settings.provider {
            AiProvider::Claude => self
                .client
                .post(&endpoint)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(&anthropic_body(model, request)),
            _ => self
                .client
                .post(&endpoint)
                .bearer_auth(&self.api_key)
                .header("content-type", "application/json")
                .json(&chat_completion_body(model, request)),
        };

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::General(format!("HTTP status {status}: {body}")));
        }

        match self.settings.provider {
            AiProvider::Claude => anthropic_text(response.json::<AnthropicResponse>().await?),
            _ => chat_completion_text(response.json::<ChatCompletionResponse>().await?),
        }
    }
}

impl PlanModel for HttpPlanModel {
    fn complete(
        &self,
        request: &PlanRequest,
    ) -> impl Future<Output = Result<String, AppError>> + Send {
        self.send(request)
    }
}
