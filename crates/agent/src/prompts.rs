//! Prompt templates sent to the language model.

use serde_json::Value;
use tera::{Context, Tera};
use thiserror::Error;

use hubrelay_core::domain::object_type::ObjectType;
use hubrelay_core::domain::request::result_count;

const INTENT_TEMPLATE: &str = "intent.txt";
const SUMMARY_TEMPLATE: &str = "summary.txt";
const SYSTEM_TEMPLATE: &str = "system.txt";

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("prompt template error: {0}")]
    Template(String),
}

pub struct PromptTemplates {
    tera: Tera,
}

impl PromptTemplates {
    pub fn embedded() -> Result<Self, PromptError> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            (INTENT_TEMPLATE, include_str!("../templates/intent.txt.tera")),
            (SUMMARY_TEMPLATE, include_str!("../templates/summary.txt.tera")),
            (SYSTEM_TEMPLATE, include_str!("../templates/system.txt.tera")),
        ])
        .map_err(|error| PromptError::Template(error.to_string()))?;
        Ok(Self { tera })
    }

    pub fn intent(&self, query: &str) -> Result<String, PromptError> {
        let mut context = Context::new();
        context.insert("query", query);
        self.render(INTENT_TEMPLATE, &context)
    }

    /// Summary prompt embedding the pretty-printed envelope.
    pub fn summary(
        &self,
        query: &str,
        object_type: ObjectType,
        envelope: &Value,
    ) -> Result<String, PromptError> {
        let data = serde_json::to_string_pretty(envelope)
            .map_err(|error| PromptError::Template(error.to_string()))?;

        let mut context = Context::new();
        context.insert("query", query);
        context.insert("result_count", &result_count(envelope));
        context.insert("object_type", object_type.as_str());
        context.insert("data", &data);
        self.render(SUMMARY_TEMPLATE, &context)
    }

    pub fn system(&self) -> Result<String, PromptError> {
        self.render(SYSTEM_TEMPLATE, &Context::new())
    }

    fn render(&self, name: &str, context: &Context) -> Result<String, PromptError> {
        self.tera
            .render(name, context)
            .map(|rendered| rendered.trim().to_string())
            .map_err(|error| PromptError::Template(error.to_string()))
    }
}
