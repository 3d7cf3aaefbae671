//! Scripted fakes shared by the agent tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use hubrelay_core::domain::request::CrmRequest;
use hubrelay_crm::{CrmError, CrmGateway};
use serde_json::Value;

use crate::llm::{ChatMessage, ChatTurn, LlmClient, ToolSchema};

/// Replays a fixed list of turns; errors carry the given message.
pub struct ScriptedLlm {
    turns: Mutex<VecDeque<Result<ChatTurn, String>>>,
    seen: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedLlm {
    pub fn new(turns: Vec<Result<ChatTurn, &str>>) -> Self {
        Self {
            turns: Mutex::new(
                turns.into_iter().map(|turn| turn.map_err(str::to_string)).collect(),
            ),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn text(replies: Vec<Result<&str, &str>>) -> Self {
        Self::new(
            replies
                .into_iter()
                .map(|reply| reply.map(|text| ChatTurn::Content(text.to_string())))
                .collect(),
        )
    }

    /// Every conversation sent to the model, in call order.
    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.seen.lock().expect("seen lock").clone()
    }

    /// Content of the last message of each call.
    pub fn prompts(&self) -> Vec<String> {
        self.calls()
            .iter()
            .filter_map(|messages| messages.last().and_then(|message| message.content.clone()))
            .collect()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn chat(&self, messages: &[ChatMessage], _tools: &[ToolSchema]) -> Result<ChatTurn> {
        self.seen.lock().expect("seen lock").push(messages.to_vec());
        match self.turns.lock().expect("turns lock").pop_front() {
            Some(Ok(turn)) => Ok(turn),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("script exhausted")),
        }
    }
}

pub struct FakeCrm {
    reply: Result<Value, u16>,
    requests: Mutex<Vec<CrmRequest>>,
}

impl FakeCrm {
    pub fn returning(envelope: Value) -> Self {
        Self { reply: Ok(envelope), requests: Mutex::new(Vec::new()) }
    }

    pub fn failing(status: u16) -> Self {
        Self { reply: Err(status), requests: Mutex::new(Vec::new()) }
    }

    pub fn requests(&self) -> Vec<CrmRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl CrmGateway for FakeCrm {
    async fn execute(&self, request: &CrmRequest) -> Result<Value, CrmError> {
        self.requests.lock().expect("requests lock").push(request.clone());
        match &self.reply {
            Ok(envelope) => Ok(envelope.clone()),
            Err(status) => Err(CrmError::Status { status: *status, body: "fake failure".to_string() }),
        }
    }
}
