pub mod classifier;
pub mod config;
pub mod domain;
pub mod errors;
pub mod format;
pub mod plan;

pub use classifier::{extract_json_block, parse_model_reply, ClassifiedQuery, RuleBasedClassifier};
pub use config::{AppConfig, ConfigError, CrmConfig, LlmConfig, LlmProvider, LoadOptions};
pub use domain::intent::{Intent, IntentData};
pub use domain::object_type::ObjectType;
pub use domain::request::{CrmRequest, FilterOperator, HttpMethod, SearchFilter};
pub use errors::{ApplicationError, DomainError};
pub use plan::{plan_request, PlanOptions, PlanShape, RequestPlan};
