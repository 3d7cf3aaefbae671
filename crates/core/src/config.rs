use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CRM_BASE_URL: &str = "https://api.hubapi.com";
pub const DEFAULT_GROQ_MODEL: &str = "meta-llama/llama-4-scout-17b-16e-instruct";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.1";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub crm: CrmConfig,
    pub llm: LlmConfig,
    pub agent: AgentConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct CrmConfig {
    pub base_url: String,
    pub bearer_token: Option<SecretString>,
    pub api_key: Option<SecretString>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    /// `None` runs the relay rule-based only.
    pub provider: Option<LlmProvider>,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub api_version: Option<String>,
    pub deployment: Option<String>,
    pub temperature: f32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub max_iterations: u32,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LlmProvider {
    #[serde(rename = "groq")]
    Groq,
    #[serde(rename = "azure_openai")]
    AzureOpenAi,
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "ollama")]
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
    pub crm_base_url: Option<String>,
    pub crm_bearer_token: Option<String>,
    pub crm_api_key: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_api_key: Option<String>,
    pub llm_base_url: Option<String>,
    pub llm_model: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind_address: "0.0.0.0".to_string(),
                port: 8000,
                graceful_shutdown_secs: 15,
            },
            crm: CrmConfig {
                base_url: DEFAULT_CRM_BASE_URL.to_string(),
                bearer_token: None,
                api_key: None,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                provider: None,
                api_key: None,
                base_url: None,
                model: None,
                api_version: None,
                deployment: None,
                temperature: 0.7,
                timeout_secs: 60,
            },
            agent: AgentConfig { max_iterations: 5 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider.is_some()
    }

    /// Model name sent with each completion request.
    pub fn resolved_model(&self) -> Option<String> {
        if let Some(model) = self.model.as_ref().filter(|value| !value.trim().is_empty()) {
            return Some(model.clone());
        }

        match self.provider? {
            LlmProvider::Groq => Some(DEFAULT_GROQ_MODEL.to_string()),
            LlmProvider::OpenAi => Some(DEFAULT_OPENAI_MODEL.to_string()),
            LlmProvider::Ollama => Some(DEFAULT_OLLAMA_MODEL.to_string()),
            LlmProvider::AzureOpenAi => self.deployment.clone(),
        }
    }
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Groq => "groq",
            Self::AzureOpenAi => "azure_openai",
            Self::OpenAi => "openai",
            Self::Ollama => "ollama",
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "groq" => Ok(Self::Groq),
            "azure_openai" | "azure" => Ok(Self::AzureOpenAi),
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected groq|azure_openai|openai|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("hubrelay.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_legacy_env();
        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(crm) = patch.crm {
            if let Some(base_url) = crm.base_url {
                self.crm.base_url = base_url;
            }
            if let Some(crm_bearer_token_value) = crm.bearer_token.filter(|v| !is_placeholder(v)) {
                self.crm.bearer_token = Some(secret_value(crm_bearer_token_value));
            }
            if let Some(crm_api_key_value) = crm.api_key.filter(|v| !is_placeholder(v)) {
                self.crm.api_key = Some(secret_value(crm_api_key_value));
            }
            if let Some(timeout_secs) = crm.timeout_secs {
                self.crm.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = Some(provider);
            }
            if let Some(llm_api_key_value) = llm.api_key.filter(|v| !is_placeholder(v)) {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = Some(model);
            }
            if let Some(api_version) = llm.api_version {
                self.llm.api_version = Some(api_version);
            }
            if let Some(deployment) = llm.deployment {
                self.llm.deployment = Some(deployment);
            }
            if let Some(temperature) = llm.temperature {
                self.llm.temperature = temperature;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(agent) = patch.agent {
            if let Some(max_iterations) = agent.max_iterations {
                self.agent.max_iterations = max_iterations;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    /// Picks up the unprefixed variable names older deployments export.
    ///
    /// These only fill gaps: anything already set by the config file stays, and the
    /// `HUBRELAY_*` variables applied afterwards still win.
    fn apply_legacy_env(&mut self) {
        if self.crm.bearer_token.is_none() {
            self.crm.bearer_token = read_env("HUBSPOT_BEARER_TOKEN").map(secret_value);
        }
        if self.crm.api_key.is_none() {
            self.crm.api_key = read_env("HUBSPOT_API_KEY").map(secret_value);
        }

        if self.llm.provider.is_some() {
            return;
        }

        if let Some(groq_api_key_value) = read_env("GROQ_API_KEY") {
            self.llm.provider = Some(LlmProvider::Groq);
            self.llm.api_key = Some(secret_value(groq_api_key_value));
            if self.llm.model.is_none() {
                self.llm.model = read_env("GROQ_MODEL");
            }
            return;
        }

        let azure = (
            read_env("AZURE_OPENAI_API_KEY"),
            read_env("AZURE_OPENAI_API_BASE"),
            read_env("AZURE_OPENAI_API_VERSION"),
            read_env("AZURE_OPENAI_DEPLOYMENT_NAME"),
        );
        if let (Some(azure_api_key_value), Some(base_url), Some(api_version), Some(deployment)) =
            azure
        {
            self.llm.provider = Some(LlmProvider::AzureOpenAi);
            self.llm.api_key = Some(secret_value(azure_api_key_value));
            self.llm.base_url = Some(base_url);
            self.llm.api_version = Some(api_version);
            self.llm.deployment = Some(deployment);
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("HUBRELAY_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("HUBRELAY_SERVER_PORT") {
            self.server.port = parse_u16("HUBRELAY_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("HUBRELAY_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("HUBRELAY_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("HUBRELAY_CRM_BASE_URL") {
            self.crm.base_url = value;
        }
        if let Some(value) = read_env("HUBRELAY_CRM_BEARER_TOKEN") {
            self.crm.bearer_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("HUBRELAY_CRM_API_KEY") {
            self.crm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("HUBRELAY_CRM_TIMEOUT_SECS") {
            self.crm.timeout_secs = parse_u64("HUBRELAY_CRM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("HUBRELAY_LLM_PROVIDER") {
            self.llm.provider = Some(value.parse()?);
        }
        if let Some(value) = read_env("HUBRELAY_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("HUBRELAY_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("HUBRELAY_LLM_MODEL") {
            self.llm.model = Some(value);
        }
        if let Some(value) = read_env("HUBRELAY_LLM_API_VERSION") {
            self.llm.api_version = Some(value);
        }
        if let Some(value) = read_env("HUBRELAY_LLM_DEPLOYMENT") {
            self.llm.deployment = Some(value);
        }
        if let Some(value) = read_env("HUBRELAY_LLM_TEMPERATURE") {
            self.llm.temperature = parse_f32("HUBRELAY_LLM_TEMPERATURE", &value)?;
        }
        if let Some(value) = read_env("HUBRELAY_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("HUBRELAY_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("HUBRELAY_AGENT_MAX_ITERATIONS") {
            self.agent.max_iterations = parse_u32("HUBRELAY_AGENT_MAX_ITERATIONS", &value)?;
        }

        let log_level =
            read_env("HUBRELAY_LOGGING_LEVEL").or_else(|| read_env("HUBRELAY_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("HUBRELAY_LOGGING_FORMAT").or_else(|| read_env("HUBRELAY_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(bind_address) = overrides.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(crm_base_url) = overrides.crm_base_url {
            self.crm.base_url = crm_base_url;
        }
        if let Some(crm_bearer_token) = overrides.crm_bearer_token {
            self.crm.bearer_token = Some(secret_value(crm_bearer_token));
        }
        if let Some(crm_api_key) = overrides.crm_api_key {
            self.crm.api_key = Some(secret_value(crm_api_key));
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = Some(llm_provider);
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(llm_base_url) = overrides.llm_base_url {
            self.llm.base_url = Some(llm_base_url);
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = Some(llm_model);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_server(&self.server)?;
        validate_crm(&self.crm)?;
        validate_llm(&self.llm)?;
        validate_agent(&self.agent)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("hubrelay.toml"), PathBuf::from("config/hubrelay.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation("server.bind_address must not be empty".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_crm(crm: &CrmConfig) -> Result<(), ConfigError> {
    if !crm.base_url.starts_with("http://") && !crm.base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "crm.base_url must start with http:// or https://".to_string(),
        ));
    }

    if crm.timeout_secs == 0 || crm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "crm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if !(0.0..=2.0).contains(&llm.temperature) {
        return Err(ConfigError::Validation(
            "llm.temperature must be in range 0.0..=2.0".to_string(),
        ));
    }

    let has_api_key =
        llm.api_key.as_ref().map(|value| !value.expose_secret().trim().is_empty()).unwrap_or(false);
    let has = |value: &Option<String>| {
        value.as_ref().map(|inner| !inner.trim().is_empty()).unwrap_or(false)
    };

    match llm.provider {
        None | Some(LlmProvider::Ollama) => {}
        Some(LlmProvider::Groq) | Some(LlmProvider::OpenAi) => {
            if !has_api_key {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for groq/openai providers".to_string(),
                ));
            }
        }
        Some(LlmProvider::AzureOpenAi) => {
            if !has_api_key
                || !has(&llm.base_url)
                || !has(&llm.api_version)
                || !has(&llm.deployment)
            {
                return Err(ConfigError::Validation(
                    "llm.api_key, llm.base_url, llm.api_version and llm.deployment are required for azure_openai"
                        .to_string(),
                ));
            }
        }
    }

    if let Some(base_url) = llm.base_url.as_ref().filter(|value| !value.trim().is_empty()) {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "llm.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_agent(agent: &AgentConfig) -> Result<(), ConfigError> {
    if agent.max_iterations == 0 {
        return Err(ConfigError::Validation(
            "agent.max_iterations must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

/// Template values such as `your_hubspot_api_key_here` count as unset.
fn is_placeholder(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty() || (trimmed.starts_with("your_") && trimmed.ends_with("_here"))
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !is_placeholder(value))
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_f32(key: &str, value: &str) -> Result<f32, ConfigError> {
    value.parse::<f32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    server: Option<ServerPatch>,
    crm: Option<CrmPatch>,
    llm: Option<LlmPatch>,
    agent: Option<AgentPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct CrmPatch {
    base_url: Option<String>,
    bearer_token: Option<String>,
    api_key: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    api_version: Option<String>,
    deployment: Option<String>,
    temperature: Option<f32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPatch {
    max_iterations: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
