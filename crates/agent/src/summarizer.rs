use std::sync::Arc;

use hubrelay_core::domain::object_type::ObjectType;
use hubrelay_core::domain::request::result_count;
use hubrelay_core::format::found_message;
use serde_json::Value;
use tracing::warn;

use crate::llm::LlmClient;
use crate::prompts::PromptTemplates;

/// Produces the `/query` answer for list, count and search results.
#[derive(Clone)]
pub enum Summarizer {
    LlmBacked { llm: Arc<dyn LlmClient>, prompts: Arc<PromptTemplates> },
    Template,
}

impl Summarizer {
    pub async fn summarize(&self, query: &str, object_type: ObjectType, envelope: &Value) -> String {
        let fallback = || found_message(object_type, result_count(envelope));
        let Self::LlmBacked { llm, prompts } = self else {
            return fallback();
        };

        let prompt = match prompts.summary(query, object_type, envelope) {
            Ok(prompt) => prompt,
            Err(error) => {
                warn!(event_name = "agent.summarizer.prompt_error", error = %error, "using template summary");
                return fallback();
            }
        };

        match llm.complete(&prompt).await {
            Ok(reply) if !reply.trim().is_empty() => reply.trim().to_string(),
            Ok(_) => fallback(),
            Err(error) => {
                warn!(
                    event_name = "agent.summarizer.llm_error",
                    object_type = object_type.as_str(),
                    error = %error,
                    "llm summary failed, using template summary"
                );
                fallback()
            }
        }
    }
}
