use std::sync::Arc;

use hubrelay_agent::classifier::ClassifierStrategy;
use hubrelay_agent::conversation::InMemoryConversationStore;
use hubrelay_agent::guardrails::GuardrailPolicy;
use hubrelay_agent::llm::{LlmClient, LlmError, OpenAiCompatibleClient};
use hubrelay_agent::prompts::{PromptError, PromptTemplates};
use hubrelay_agent::query::QueryRouter;
use hubrelay_agent::runtime::AgentRuntime;
use hubrelay_agent::summarizer::Summarizer;
use hubrelay_agent::tools::crm_tools;
use hubrelay_core::config::{AppConfig, ConfigError};
use hubrelay_crm::{CrmClient, CrmError, CrmGateway};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub router: Arc<QueryRouter>,
    pub agent: Arc<AgentRuntime>,
}

pub struct Application {
    pub config: AppConfig,
    pub state: AppState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("crm client setup failed: {0}")]
    Crm(#[from] CrmError),
    #[error("llm client setup failed: {0}")]
    Llm(#[from] LlmError),
    #[error("prompt setup failed: {0}")]
    Prompt(#[from] PromptError),
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let crm_client = CrmClient::new(&config.crm)?;
    if crm_client.auth_mode() == "none" {
        warn!(
            event_name = "system.bootstrap.crm_unauthenticated",
            correlation_id = "bootstrap",
            "no crm bearer token or api key configured; requests will be sent unauthenticated"
        );
    } else {
        info!(
            event_name = "system.bootstrap.crm_ready",
            correlation_id = "bootstrap",
            auth_mode = crm_client.auth_mode(),
            base_url = %config.crm.base_url,
            "crm client configured"
        );
    }

    let llm: Option<Arc<dyn LlmClient>> = match config.llm.provider {
        Some(provider) => {
            let client = OpenAiCompatibleClient::from_config(&config.llm)?;
            info!(
                event_name = "system.bootstrap.llm_ready",
                correlation_id = "bootstrap",
                provider = provider.as_str(),
                model = client.model(),
                "llm client configured"
            );
            Some(Arc::new(client))
        }
        None => {
            warn!(
                event_name = "system.bootstrap.llm_disabled",
                correlation_id = "bootstrap",
                "no llm provider configured; using rule-based classification and the chat agent is unavailable"
            );
            None
        }
    };

    let state = assemble(Arc::new(crm_client), llm, config.agent.max_iterations)?;
    Ok(Application { config, state })
}

/// Wires the router and agent around an already-built CRM gateway and optional model.
pub fn assemble(
    crm: Arc<dyn CrmGateway>,
    llm: Option<Arc<dyn LlmClient>>,
    max_iterations: u32,
) -> Result<AppState, BootstrapError> {
    let prompts = Arc::new(PromptTemplates::embedded()?);

    let (classifier, summarizer) = match &llm {
        Some(llm) => (
            ClassifierStrategy::LlmBacked { llm: llm.clone(), prompts: prompts.clone() },
            Summarizer::LlmBacked { llm: llm.clone(), prompts: prompts.clone() },
        ),
        None => (ClassifierStrategy::RuleBased, Summarizer::Template),
    };
    let router = QueryRouter::new(crm.clone(), classifier, summarizer);

    let mut agent = AgentRuntime::new(
        router.clone(),
        Arc::new(InMemoryConversationStore::default()),
        crm_tools(crm),
        GuardrailPolicy::default(),
    );
    if let Some(llm) = llm {
        agent = agent.with_llm(llm, prompts.system()?, max_iterations);
    }

    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        classifier = router.classifier().label(),
        agent_enabled = agent.is_enabled(),
        "application assembled"
    );

    Ok(AppState { router: Arc::new(router), agent: Arc::new(agent) })
}

#[cfg(test)]
mod tests {
    use hubrelay_core::config::{AppConfig, LlmProvider};

    use crate::bootstrap::{bootstrap_with_config, BootstrapError};

    #[test]
    fn azure_without_deployment_fails_fast() {
        let mut config = AppConfig::default();
        config.llm.provider = Some(LlmProvider::AzureOpenAi);
        config.llm.api_key = Some("azure-key".to_string().into());
        config.llm.base_url = Some("https://acme.openai.azure.com".to_string());

        let error = match bootstrap_with_config(config) {
            Ok(_) => panic!("azure without deployment should not bootstrap"),
            Err(error) => error,
        };

        assert!(matches!(error, BootstrapError::Llm(_)));
        assert!(error.to_string().contains("llm.deployment"), "{error}");
    }

    #[test]
    fn defaults_assemble_rule_based_application() {
        let mut config = AppConfig::default();
        config.crm.bearer_token = Some("pat-test".to_string().into());

        let app = bootstrap_with_config(config).expect("bootstrap with defaults");

        assert_eq!(app.state.router.classifier().label(), "rule_based");
        assert!(!app.state.agent.is_enabled());
    }

    #[test]
    fn configured_provider_enables_agent() {
        let mut config = AppConfig::default();
        config.llm.provider = Some(LlmProvider::Groq);
        config.llm.api_key = Some("gsk-test".to_string().into());

        let app = bootstrap_with_config(config).expect("bootstrap with groq");

        assert_eq!(app.state.router.classifier().label(), "llm");
        assert!(app.state.agent.is_enabled());
    }
}
