use std::time::{Duration, Instant};

use async_trait::async_trait;
use hubrelay_core::config::CrmConfig;
use hubrelay_core::domain::request::{CrmRequest, HttpMethod};
use reqwest::{Client, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum CrmError {
    #[error("crm returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("crm response could not be decoded: {0}")]
    Decode(String),
    #[error("crm http client could not be built: {0}")]
    Client(String),
}

/// Executes planned requests against the CRM.
#[async_trait]
pub trait CrmGateway: Send + Sync {
    async fn execute(&self, request: &CrmRequest) -> Result<Value, CrmError>;
}

#[derive(Clone, Debug)]
pub enum CrmAuth {
    Bearer(SecretString),
    ApiKey(SecretString),
    Anonymous,
}

impl CrmAuth {
    /// Bearer token wins over an API key when both are configured.
    pub fn from_config(config: &CrmConfig) -> Self {
        match (&config.bearer_token, &config.api_key) {
            (Some(token), _) => Self::Bearer(token.clone()),
            (None, Some(key)) => Self::ApiKey(key.clone()),
            (None, None) => Self::Anonymous,
        }
    }

    pub fn mode(&self) -> &'static str {
        match self {
            Self::Bearer(_) => "bearer",
            Self::ApiKey(_) => "api_key",
            Self::Anonymous => "none",
        }
    }

    fn apply(&self, builder: RequestBuilder) -> RequestBuilder {
        match self {
            Self::Bearer(token) => builder.bearer_auth(token.expose_secret()),
            Self::ApiKey(key) => builder.query(&[("hapikey", key.expose_secret())]),
            Self::Anonymous => builder,
        }
    }
}

#[derive(Clone, Debug)]
pub struct CrmClient {
    http: Client,
    base_url: String,
    auth: CrmAuth,
}

impl CrmClient {
    pub fn new(config: &CrmConfig) -> Result<Self, CrmError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| CrmError::Client(error.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth: CrmAuth::from_config(config),
        })
    }

    pub fn auth_mode(&self) -> &'static str {
        self.auth.mode()
    }

    fn build(&self, request: &CrmRequest) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, request.path);
        let builder = match request.method {
            HttpMethod::Get => self.http.get(url).query(&request.query),
            HttpMethod::Post => {
                let body = request.body.clone().unwrap_or_else(|| json!({}));
                self.http.post(url).query(&request.query).json(&body)
            }
        };
        self.auth.apply(builder)
    }
}

#[async_trait]
impl CrmGateway for CrmClient {
    async fn execute(&self, request: &CrmRequest) -> Result<Value, CrmError> {
        let started = Instant::now();
        debug!(
            event_name = "crm.request.start",
            method = request.method.as_str(),
            path = %request.path,
            auth_mode = self.auth.mode(),
            "sending crm request"
        );

        let response = match self.build(request).send().await {
            Ok(response) => response,
            Err(error) => {
                warn!(
                    event_name = "crm.request.transport_error",
                    method = request.method.as_str(),
                    path = %request.path,
                    error = %error,
                    "crm request failed before a response was received"
                );
                return Ok(transport_failure_envelope(&error.to_string()));
            }
        };

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            warn!(
                event_name = "crm.request.unauthorized",
                path = %request.path,
                auth_mode = self.auth.mode(),
                "crm rejected the configured credentials"
            );
            return Ok(authentication_failed_envelope());
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                event_name = "crm.request.status_error",
                path = %request.path,
                status = status.as_u16(),
                "crm returned a non-success status"
            );
            return Err(CrmError::Status { status: status.as_u16(), body });
        }

        let raw = match response.text().await {
            Ok(raw) => raw,
            Err(error) => {
                warn!(
                    event_name = "crm.request.transport_error",
                    path = %request.path,
                    error = %error,
                    "crm response body could not be read"
                );
                return Ok(transport_failure_envelope(&error.to_string()));
            }
        };

        let envelope = serde_json::from_str::<Value>(&raw)
            .map_err(|error| CrmError::Decode(error.to_string()))?;

        debug!(
            event_name = "crm.request.completed",
            path = %request.path,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "crm request completed"
        );
        Ok(envelope)
    }
}

pub fn authentication_failed_envelope() -> Value {
    json!({ "results": [], "total": 0, "message": "Authentication failed" })
}

pub fn transport_failure_envelope(message: &str) -> Value {
    json!({ "results": [], "total": 0, "error": message })
}
