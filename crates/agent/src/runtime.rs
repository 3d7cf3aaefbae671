use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::conversation::ConversationStore;
use crate::guardrails::{fallback_failure_message, GuardrailDecision, GuardrailPolicy};
use crate::llm::{ChatMessage, ChatTurn, LlmClient};
use crate::query::QueryRouter;
use crate::tools::ToolRegistry;

pub const AGENT_UNAVAILABLE_MESSAGE: &str =
    "LangChain integration is not available. Please install the required packages.";

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent stopped after {0} iterations without a final answer")]
    IterationLimit(u32),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub data: Option<Value>,
    pub conversation_id: String,
}

struct AgentModel {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
    max_iterations: u32,
}

/// Tool-calling chat loop over the CRM tools, with per-conversation memory.
pub struct AgentRuntime {
    router: QueryRouter,
    conversations: Arc<dyn ConversationStore>,
    tools: ToolRegistry,
    guardrails: GuardrailPolicy,
    model: Option<AgentModel>,
}

impl AgentRuntime {
    pub fn new(
        router: QueryRouter,
        conversations: Arc<dyn ConversationStore>,
        tools: ToolRegistry,
        guardrails: GuardrailPolicy,
    ) -> Self {
        Self { router, conversations, tools, guardrails, model: None }
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>, system_prompt: String, max_iterations: u32) -> Self {
        self.model = Some(AgentModel { llm, system_prompt, max_iterations: max_iterations.max(1) });
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.model.is_some()
    }

    pub async fn handle_chat(&self, request: ChatRequest) -> ChatResponse {
        let conversation_id = match request.conversation_id.filter(|id| !id.trim().is_empty()) {
            Some(id) => id,
            None => self.conversations.next_id().await,
        };

        let Some(model) = &self.model else {
            return ChatResponse {
                response: AGENT_UNAVAILABLE_MESSAGE.to_string(),
                data: None,
                conversation_id,
            };
        };

        match self.run_turn(model, &conversation_id, &request.message).await {
            Ok(answer) => {
                info!(
                    event_name = "agent.chat.completed",
                    conversation_id = %conversation_id,
                    "agent produced a final answer"
                );
                let data = extract_chat_data(&answer);
                ChatResponse { response: answer, data, conversation_id }
            }
            Err(error) => self.recover(conversation_id, &request.message, error).await,
        }
    }

    async fn run_turn(&self, model: &AgentModel, conversation_id: &str, message: &str) -> Result<String> {
        self.conversations.create(conversation_id).await?;
        let history = self.conversations.get(conversation_id).await?.unwrap_or_default();

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(model.system_prompt.clone()));
        messages.extend(history);
        messages.push(ChatMessage::user(message));

        let schemas = self.tools.schemas();
        for iteration in 1..=model.max_iterations {
            match model.llm.chat(&messages, &schemas).await? {
                ChatTurn::Content(answer) => {
                    self.conversations
                        .append(conversation_id, vec![
                            ChatMessage::user(message),
                            ChatMessage::assistant(answer.clone()),
                        ])
                        .await?;
                    return Ok(answer);
                }
                ChatTurn::ToolCalls(calls) => {
                    info!(
                        event_name = "agent.chat.tool_calls",
                        conversation_id = %conversation_id,
                        iteration,
                        tool_calls = calls.len(),
                        "model requested tool calls"
                    );
                    messages.push(ChatMessage::assistant_tool_calls(calls.clone()));
                    for call in &calls {
                        let output = self.tools.execute(&call.name, &call.arguments).await;
                        messages.push(ChatMessage::tool_result(call, output));
                    }
                }
            }
        }

        Err(AgentError::IterationLimit(model.max_iterations).into())
    }

    async fn recover(&self, conversation_id: String, message: &str, error: anyhow::Error) -> ChatResponse {
        let decision = self.guardrails.evaluate(&error);
        let response = match decision {
            GuardrailDecision::Degrade { reason_code, user_message } => {
                warn!(
                    event_name = "agent.chat.degraded",
                    conversation_id = %conversation_id,
                    reason_code,
                    error = %format!("{error:#}"),
                    "agent failed, answering with canned message"
                );
                user_message
            }
            GuardrailDecision::Fallback { reason_code, prefix } => {
                warn!(
                    event_name = "agent.chat.fallback",
                    conversation_id = %conversation_id,
                    reason_code,
                    error = %format!("{error:#}"),
                    "agent failed, falling back to plain search"
                );
                match self.router.natural_language_search(message).await {
                    Ok(result) => format!("{prefix}{result}"),
                    Err(fallback_error) => fallback_failure_message(&fallback_error.to_string()),
                }
            }
        };

        ChatResponse { response, data: None, conversation_id }
    }
}

/// Contents of the first ```` ```json ```` block in an answer, if it parses.
pub fn extract_chat_data(answer: &str) -> Option<Value> {
    const OPEN: &str = "```json";
    let start = answer.find(OPEN)? + OPEN.len();
    let end = start + answer[start..].find("```")?;
    serde_json::from_str(answer[start..end].trim()).ok()
}
