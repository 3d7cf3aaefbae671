//! What the chat endpoint says when the agent loop fails.

use crate::llm::LlmError;

pub const AUTH_FAILURE_MESSAGE: &str =
    "There seems to be an issue with the LLM provider authentication. Please check your API keys and try again.";
pub const RATE_LIMIT_MESSAGE: &str =
    "I'm currently experiencing high demand. Please try again in a moment.";
pub const FALLBACK_PREFIX: &str =
    "I encountered an issue with the advanced AI agent, so I'm using a simpler method to answer your question: ";

pub fn fallback_failure_message(error: &str) -> String {
    format!(
        "I'm sorry, but I encountered an error processing your request. Please try again with a \
         different query or check your HubSpot connection. Error details: {error}"
    )
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    /// Answer with a canned message; no retry.
    Degrade { reason_code: &'static str, user_message: String },
    /// Answer through the plain-text search, prefixed with an apology.
    Fallback { reason_code: &'static str, prefix: &'static str },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GuardrailPolicy;

impl GuardrailPolicy {
    /// Typed LLM errors decide directly; anything else is matched on its message text.
    pub fn evaluate(&self, error: &anyhow::Error) -> GuardrailDecision {
        let typed = error.chain().find_map(|cause| cause.downcast_ref::<LlmError>());
        let message = format!("{error:#}").to_lowercase();

        let authentication = matches!(typed, Some(LlmError::Authentication(_)))
            || message.contains("authentication")
            || message.contains("api key");
        if authentication {
            return GuardrailDecision::Degrade {
                reason_code: "llm_authentication_failed",
                user_message: AUTH_FAILURE_MESSAGE.to_string(),
            };
        }

        let rate_limited = matches!(typed, Some(LlmError::RateLimited(_)))
            || message.contains("rate limit")
            || message.contains("too many requests");
        if rate_limited {
            return GuardrailDecision::Degrade {
                reason_code: "llm_rate_limited",
                user_message: RATE_LIMIT_MESSAGE.to_string(),
            };
        }

        GuardrailDecision::Fallback { reason_code: "agent_failed", prefix: FALLBACK_PREFIX }
    }
}
