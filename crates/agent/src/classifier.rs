//! Intent classification strategy chosen once at startup.

use std::sync::Arc;

use hubrelay_core::classifier::{parse_model_reply, ClassifiedQuery, RuleBasedClassifier};
use tracing::{debug, warn};

use crate::llm::LlmClient;
use crate::prompts::PromptTemplates;

#[derive(Clone)]
pub enum ClassifierStrategy {
    /// Ask the model first; any call or parse failure falls through to the rules.
    LlmBacked { llm: Arc<dyn LlmClient>, prompts: Arc<PromptTemplates> },
    RuleBased,
}

impl ClassifierStrategy {
    pub fn label(&self) -> &'static str {
        match self {
            Self::LlmBacked { .. } => "llm",
            Self::RuleBased => "rule_based",
        }
    }

    pub async fn classify(&self, query: &str) -> ClassifiedQuery {
        let rules = RuleBasedClassifier::new();
        let Self::LlmBacked { llm, prompts } = self else {
            return rules.classify(query);
        };

        let prompt = match prompts.intent(query) {
            Ok(prompt) => prompt,
            Err(error) => {
                warn!(event_name = "agent.classifier.prompt_error", error = %error, "using rule-based classifier");
                return rules.classify(query);
            }
        };

        match llm.complete(&prompt).await {
            Ok(reply) => match parse_model_reply(&reply) {
                Some(classified) => {
                    debug!(
                        event_name = "agent.classifier.llm",
                        intent = classified.intent.as_str(),
                        "classified query with llm"
                    );
                    classified
                }
                None => {
                    warn!(
                        event_name = "agent.classifier.unparseable_reply",
                        "llm reply carried no intent json, using rule-based classifier"
                    );
                    rules.classify(query)
                }
            },
            Err(error) => {
                warn!(
                    event_name = "agent.classifier.llm_error",
                    error = %error,
                    "llm classification failed, using rule-based classifier"
                );
                rules.classify(query)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use hubrelay_core::domain::intent::Intent;

    use super::ClassifierStrategy;
    use crate::prompts::PromptTemplates;
    use crate::testing::ScriptedLlm;

    fn llm_backed(replies: Vec<Result<&str, &str>>) -> ClassifierStrategy {
        ClassifierStrategy::LlmBacked {
            llm: Arc::new(ScriptedLlm::text(replies)),
            prompts: Arc::new(PromptTemplates::embedded().expect("templates")),
        }
    }

    #[tokio::test]
    async fn fenced_model_reply_is_used() {
        let strategy = llm_backed(vec![Ok(
            "Sure:\n```json\n{\"intent\": \"count\", \"intent_data\": {\"object_type\": \"deals\"}}\n```",
        )]);

        let classified = strategy.classify("whatever").await;

        assert_eq!(classified.intent, Intent::Count);
        assert_eq!(classified.data.object_type.as_deref(), Some("deals"));
    }

    #[tokio::test]
    async fn garbage_reply_falls_back_to_rules() {
        let strategy = llm_backed(vec![Ok("I am not sure what you mean")]);

        let classified = strategy.classify("how many contacts do we have").await;

        assert_eq!(classified.intent, Intent::Lookup);
        assert_eq!(classified.data.object_type.as_deref(), Some("contacts"));
    }

    #[tokio::test]
    async fn llm_error_falls_back_to_rules() {
        let strategy = llm_backed(vec![Err("connection reset")]);

        let classified = strategy.classify("how many deals").await;

        assert_eq!(classified.intent, Intent::Count);
        assert_eq!(strategy.label(), "llm");
    }

    #[tokio::test]
    async fn rule_based_strategy_never_calls_a_model() {
        let classified = ClassifierStrategy::RuleBased.classify("list 10 companies").await;

        assert_eq!(classified.intent, Intent::List);
        assert_eq!(classified.data.limit, Some(10));
        assert_eq!(classified.data.object_type.as_deref(), Some("companies"));
    }
}
