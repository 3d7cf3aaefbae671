use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use hubrelay_core::config::{LlmConfig, LlmProvider};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm authentication failed: {0}")]
    Authentication(String),
    #[error("llm rate limit exceeded: {0}")]
    RateLimited(String),
    #[error("llm returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("llm transport failure: {0}")]
    Transport(String),
    #[error("llm response could not be decoded: {0}")]
    Decode(String),
    #[error("llm returned an empty response")]
    Empty,
    #[error("llm is not configured: {0}")]
    NotConfigured(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Raw JSON argument string as produced by the model.
    pub arguments: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: Option<String>,
    pub tool_calls: Option<Vec<ToolCall>>,
    pub tool_call_id: Option<String>,
    pub name: Option<String>,
}

impl ChatMessage {
    fn text(role: ChatRole, content: impl Into<String>) -> Self {
        Self { role, content: Some(content.into()), tool_calls: None, tool_call_id: None, name: None }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::text(ChatRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(ChatRole::Assistant, content)
    }

    pub fn assistant_tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: None,
            tool_calls: Some(calls),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn tool_result(call: &ToolCall, content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(call.id.clone()),
            name: Some(call.name.clone()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object.
    pub parameters: Value,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatTurn {
    Content(String),
    ToolCalls(Vec<ToolCall>),
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat(&self, messages: &[ChatMessage], tools: &[ToolSchema]) -> Result<ChatTurn>;

    async fn complete(&self, prompt: &str) -> Result<String> {
        match self.chat(&[ChatMessage::user(prompt)], &[]).await? {
            ChatTurn::Content(content) => Ok(content),
            ChatTurn::ToolCalls(_) => {
                Err(LlmError::Decode("tool call returned for a plain completion".to_string()).into())
            }
        }
    }
}

/// Chat-completions client for Groq, OpenAI, Azure OpenAI and Ollama.
///
/// All four speak the same request/response shape; they differ only in endpoint layout
/// and the header carrying the key.
pub struct OpenAiCompatibleClient {
    http: Client,
    provider: LlmProvider,
    endpoint: String,
    api_key: Option<SecretString>,
    model: String,
    temperature: f32,
}

impl OpenAiCompatibleClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let provider = config
            .provider
            .ok_or_else(|| LlmError::NotConfigured("llm.provider is not set".to_string()))?;
        let model = config
            .resolved_model()
            .ok_or_else(|| LlmError::NotConfigured("llm.model is not set".to_string()))?;
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| LlmError::Transport(error.to_string()))?;

        Ok(Self {
            http,
            provider,
            endpoint: chat_endpoint(config, provider)?,
            api_key: config.api_key.clone(),
            model,
            temperature: config.temperature,
        })
    }

    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, messages: &[ChatMessage], tools: &[ToolSchema]) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": format_openai_messages(messages),
            "temperature": self.temperature,
            "stream": false,
        });
        if !tools.is_empty() {
            body["tools"] = json!(format_openai_tools(tools));
            body["tool_choice"] = json!("auto");
        }
        body
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn chat(&self, messages: &[ChatMessage], tools: &[ToolSchema]) -> Result<ChatTurn> {
        let mut request = self.http.post(&self.endpoint).json(&self.request_body(messages, tools));
        if let Some(key) = &self.api_key {
            request = match self.provider {
                LlmProvider::AzureOpenAi => request.header("api-key", key.expose_secret()),
                _ => request.bearer_auth(key.expose_secret()),
            };
        }

        debug!(
            event_name = "llm.chat.start",
            provider = self.provider.as_str(),
            model = %self.model,
            message_count = messages.len(),
            tool_count = tools.len(),
            "sending chat completion"
        );

        let response =
            request.send().await.map_err(|error| LlmError::Transport(error.to_string()))?;
        let status = response.status();
        let body = response.text().await.map_err(|error| LlmError::Transport(error.to_string()))?;

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(LlmError::Authentication(body).into());
            }
            StatusCode::TOO_MANY_REQUESTS => return Err(LlmError::RateLimited(body).into()),
            status if !status.is_success() => {
                return Err(LlmError::Status { status: status.as_u16(), body }.into());
            }
            _ => {}
        }

        let payload: Value =
            serde_json::from_str(&body).map_err(|error| LlmError::Decode(error.to_string()))?;
        Ok(parse_chat_turn(&payload)?)
    }
}

fn chat_endpoint(config: &LlmConfig, provider: LlmProvider) -> Result<String, LlmError> {
    let base = config.base_url.as_deref().map(|url| url.trim_end_matches('/'));

    let endpoint = match provider {
        LlmProvider::AzureOpenAi => {
            let base = base.ok_or_else(|| {
                LlmError::NotConfigured("llm.base_url is required for azure_openai".to_string())
            })?;
            let deployment = config.deployment.as_deref().ok_or_else(|| {
                LlmError::NotConfigured("llm.deployment is required for azure_openai".to_string())
            })?;
            let api_version = config.api_version.as_deref().ok_or_else(|| {
                LlmError::NotConfigured("llm.api_version is required for azure_openai".to_string())
            })?;
            format!(
                "{base}/openai/deployments/{deployment}/chat/completions?api-version={api_version}"
            )
        }
        LlmProvider::Groq => format!("{}/chat/completions", base.unwrap_or(GROQ_BASE_URL)),
        LlmProvider::OpenAi => format!("{}/chat/completions", base.unwrap_or(OPENAI_BASE_URL)),
        LlmProvider::Ollama => format!("{}/chat/completions", base.unwrap_or(OLLAMA_BASE_URL)),
    };

    Ok(endpoint)
}

pub fn format_openai_messages(messages: &[ChatMessage]) -> Vec<Value> {
    messages
        .iter()
        .map(|message| {
            let mut formatted = json!({ "role": message.role.as_str() });
            if let Some(content) = &message.content {
                formatted["content"] = json!(content);
            }
            if let Some(calls) = &message.tool_calls {
                formatted["tool_calls"] = json!(calls
                    .iter()
                    .map(|call| json!({
                        "id": call.id,
                        "type": "function",
                        "function": {
                            "name": call.name,
                            "arguments": call.arguments,
                        }
                    }))
                    .collect::<Vec<_>>());
            }
            if let Some(id) = &message.tool_call_id {
                formatted["tool_call_id"] = json!(id);
            }
            if let Some(name) = &message.name {
                formatted["name"] = json!(name);
            }
            formatted
        })
        .collect()
}

pub fn format_openai_tools(tools: &[ToolSchema]) -> Vec<Value> {
    tools
        .iter()
        .map(|tool| {
            json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.parameters,
                }
            })
        })
        .collect()
}

fn parse_chat_turn(payload: &Value) -> Result<ChatTurn, LlmError> {
    let message = &payload["choices"][0]["message"];
    if message.is_null() {
        return Err(LlmError::Decode("response carries no choices".to_string()));
    }

    if let Some(tool_calls) = message["tool_calls"].as_array() {
        let calls = tool_calls
            .iter()
            .filter_map(|call| {
                Some(ToolCall {
                    id: call["id"].as_str()?.to_string(),
                    name: call["function"]["name"].as_str()?.to_string(),
                    arguments: call["function"]["arguments"].as_str().unwrap_or("{}").to_string(),
                })
            })
            .collect::<Vec<_>>();
        if !calls.is_empty() {
            return Ok(ChatTurn::ToolCalls(calls));
        }
    }

    match message["content"].as_str().map(str::trim) {
        Some(content) if !content.is_empty() => Ok(ChatTurn::Content(content.to_string())),
        _ => Err(LlmError::Empty),
    }
}
