use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use hubrelay_core::classifier::RuleBasedClassifier;
use hubrelay_core::domain::intent::{Intent, IntentData};
use hubrelay_core::domain::object_type::ObjectType;
use hubrelay_core::format::compact_records;
use hubrelay_core::plan::{plan_request, PlanOptions, DEFAULT_LIMIT};
use hubrelay_crm::CrmGateway;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::llm::ToolSchema;

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn schema(&self) -> ToolSchema;
    async fn execute(&self, input: Value) -> Result<Value>;

    /// Result text handed to the model when `execute` fails.
    fn failure_message(&self, error: &anyhow::Error) -> String {
        format!("Error running {}: {error:#}", self.name())
    }
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.insert(tool.name().to_string(), Box::new(tool));
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Schemas sorted by tool name.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas = self.tools.values().map(|tool| tool.schema()).collect::<Vec<_>>();
        schemas.sort_by(|left, right| left.name.cmp(&right.name));
        schemas
    }

    /// Runs a model-requested call. Never fails: every outcome becomes text the model can
    /// read on its next turn.
    pub async fn execute(&self, name: &str, arguments: &str) -> String {
        let Some(tool) = self.tools.get(name) else {
            warn!(event_name = "agent.tool.unknown", tool = name, "model requested an unknown tool");
            return format!("Unknown tool: {name}");
        };

        let input = if arguments.trim().is_empty() {
            Ok(json!({}))
        } else {
            serde_json::from_str::<Value>(arguments)
        };
        let input = match input {
            Ok(input) => input,
            Err(error) => return format!("Invalid arguments for {name}: {error}"),
        };

        match tool.execute(input).await {
            Ok(output) => {
                info!(event_name = "agent.tool.completed", tool = name, "tool call completed");
                output.to_string()
            }
            Err(error) => {
                warn!(event_name = "agent.tool.failed", tool = name, error = %error, "tool call failed");
                tool.failure_message(&error)
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct CrmToolArgs {
    #[serde(default)]
    limit: Option<i64>,
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    properties: Option<Vec<String>>,
}

/// Reads one CRM object type on the model's behalf.
pub struct CrmObjectTool {
    object_type: ObjectType,
    crm: Arc<dyn CrmGateway>,
}

impl CrmObjectTool {
    pub fn new(object_type: ObjectType, crm: Arc<dyn CrmGateway>) -> Self {
        Self { object_type, crm }
    }

    fn description(&self) -> &'static str {
        match self.object_type {
            ObjectType::Contacts => "Get contacts from HubSpot. Useful for finding contact information. You can search for specific contacts by name, email, or other properties.",
            ObjectType::Companies => "Get companies from HubSpot. Useful for finding company information. You can search for specific companies by name, domain, industry, or other properties.",
            ObjectType::Deals => "Get deals from HubSpot. Useful for finding deal information. You can search for specific deals by name, stage, amount, or other properties.",
        }
    }
}

#[async_trait]
impl Tool for CrmObjectTool {
    fn name(&self) -> &'static str {
        self.object_type.tool_name()
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "limit": {
                        "type": "integer",
                        "description": "Maximum number of records to return (1-100).",
                        "default": DEFAULT_LIMIT,
                    },
                    "query": {
                        "type": "string",
                        "description": format!("Optional free-text search over {}.", self.object_type),
                    },
                    "properties": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Optional list of record properties to return.",
                    },
                },
            }),
        }
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let args: CrmToolArgs = serde_json::from_value(input).context("malformed tool arguments")?;
        let query = args.query.as_deref().map(str::trim).filter(|query| !query.is_empty());

        let (intent, data) = match query {
            Some(query) => {
                let rules = RuleBasedClassifier::new();
                let mut hints = rules.tool_hints(self.object_type, query);
                hints.limit = args.limit.or(rules.classify(query).data.limit);
                (Intent::Search, hints)
            }
            None => (
                Intent::List,
                IntentData {
                    object_type: Some(self.object_type.as_str().to_string()),
                    limit: args.limit,
                    ..IntentData::default()
                },
            ),
        };

        let plan = plan_request(intent, &data, PlanOptions {
            default_object_type: self.object_type.as_str(),
            properties: args.properties.as_deref(),
            free_text: query,
            ..PlanOptions::default()
        })?;
        let envelope = self.crm.execute(&plan.request).await?;
        Ok(compact_records(self.object_type, &envelope))
    }

    fn failure_message(&self, error: &anyhow::Error) -> String {
        format!("Error retrieving {}: {error}", self.object_type)
    }
}

/// Registry holding `get_contacts`, `get_companies` and `get_deals`.
pub fn crm_tools(crm: Arc<dyn CrmGateway>) -> ToolRegistry {
    let mut registry = ToolRegistry::default();
    for object_type in ObjectType::ALL {
        registry.register(CrmObjectTool::new(object_type, crm.clone()));
    }
    registry
}
