//! Natural-language query routing for `/query`, `/search` and the chat fallback.

use std::sync::Arc;

use hubrelay_core::domain::intent::{Intent, IntentData};
use hubrelay_core::domain::request::result_count;
use hubrelay_core::errors::ApplicationError;
use hubrelay_core::format::{filter_message, lookup_message, render_listing, UNCLEAR_QUERY_MESSAGE};
use hubrelay_core::plan::{plan_request, PlanOptions, PlanShape, RequestPlan, DEFAULT_LIMIT};
use hubrelay_crm::CrmGateway;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::classifier::ClassifierStrategy;
use crate::summarizer::Summarizer;

/// Limit used by the chat fallback when the query names none.
pub const FALLBACK_SEARCH_LIMIT: i64 = 5;

fn default_object_type() -> String {
    "contacts".to_string()
}

fn default_limit() -> i64 {
    DEFAULT_LIMIT
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default = "default_object_type")]
    pub object_type: String,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub properties: Option<Vec<String>>,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            object_type: default_object_type(),
            limit: default_limit(),
            properties: None,
        }
    }

    fn plan_options(&self) -> PlanOptions<'_> {
        PlanOptions {
            default_object_type: &self.object_type,
            default_limit: self.limit,
            properties: self.properties.as_deref(),
            free_text: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub response: String,
    pub data: Option<Value>,
}

#[derive(Clone)]
pub struct QueryRouter {
    crm: Arc<dyn CrmGateway>,
    classifier: ClassifierStrategy,
    summarizer: Summarizer,
}

impl QueryRouter {
    pub fn new(crm: Arc<dyn CrmGateway>, classifier: ClassifierStrategy, summarizer: Summarizer) -> Self {
        Self { crm, classifier, summarizer }
    }

    pub fn classifier(&self) -> &ClassifierStrategy {
        &self.classifier
    }

    pub async fn execute(&self, plan: &RequestPlan) -> Result<Value, ApplicationError> {
        self.crm
            .execute(&plan.request)
            .await
            .map_err(|error| ApplicationError::Integration(error.to_string()))
    }

    pub async fn process_query(&self, request: &QueryRequest) -> Result<QueryResponse, ApplicationError> {
        let classified = self.classifier.classify(&request.query).await;
        let plan = plan_request(classified.intent, &classified.data, request.plan_options())?;
        info!(
            event_name = "query.planned",
            intent = classified.intent.as_str(),
            object_type = plan.object_type.as_str(),
            limit = plan.limit,
            shape = ?plan.shape,
            "planned crm request for query"
        );

        let envelope = self.execute(&plan).await?;
        let count = result_count(&envelope);
        let response = match &plan.shape {
            PlanShape::Lookup { subject } => lookup_message(plan.object_type, subject, count),
            PlanShape::FilteredSearch => filter_message(plan.object_type, count),
            PlanShape::TextSearch | PlanShape::List => {
                self.summarizer.summarize(&request.query, plan.object_type, &envelope).await
            }
        };

        Ok(QueryResponse { response, data: Some(envelope) })
    }

    /// Free-text CRM search; the classifier only contributes object type and limit.
    pub async fn search(&self, request: &QueryRequest) -> Result<QueryResponse, ApplicationError> {
        let classified = self.classifier.classify(&request.query).await;
        let overrides = IntentData {
            object_type: classified.data.object_type,
            limit: classified.data.limit,
            ..IntentData::default()
        };
        let plan = plan_request(Intent::Search, &overrides, PlanOptions {
            free_text: Some(&request.query),
            ..request.plan_options()
        })?;
        info!(
            event_name = "search.planned",
            object_type = plan.object_type.as_str(),
            limit = plan.limit,
            "planned crm free-text search"
        );

        let envelope = self.execute(&plan).await?;
        let response = self.summarizer.summarize(&request.query, plan.object_type, &envelope).await;
        Ok(QueryResponse { response, data: Some(envelope) })
    }

    /// Plain-text answer used when the conversational agent is unavailable or failed.
    pub async fn natural_language_search(&self, query: &str) -> Result<String, ApplicationError> {
        let classified = self.classifier.classify(query).await;
        let subject = classified.data.lookup_subject().map(str::to_string);
        if subject.is_none() && classified.data.object_type.is_none() {
            return Ok(UNCLEAR_QUERY_MESSAGE.to_string());
        }

        let plan = plan_request(classified.intent, &classified.data, PlanOptions {
            default_limit: FALLBACK_SEARCH_LIMIT,
            ..PlanOptions::default()
        })?;
        let envelope = self.execute(&plan).await?;
        Ok(render_listing(plan.object_type, &envelope, subject.as_deref()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use hubrelay_core::domain::request::HttpMethod;
    use hubrelay_core::errors::ApplicationError;
    use serde_json::json;

    use super::{QueryRequest, QueryRouter};
    use crate::classifier::ClassifierStrategy;
    use crate::summarizer::Summarizer;
    use crate::testing::FakeCrm;

    fn router(crm: Arc<FakeCrm>) -> QueryRouter {
        QueryRouter::new(crm, ClassifierStrategy::RuleBased, Summarizer::Template)
    }

    fn two_companies() -> serde_json::Value {
        json!({"total": 2, "results": [
            {"id": "1", "properties": {"name": "Acme", "domain": "acme.io", "industry": "Software"}},
            {"id": "2", "properties": {"name": "Acme Labs"}}
        ]})
    }

    #[tokio::test]
    async fn company_lookup_answers_yes_with_count() {
        let crm = Arc::new(FakeCrm::returning(two_companies()));
        let response = router(crm.clone())
            .process_query(&QueryRequest::new("is there a company named acme"))
            .await
            .expect("response");

        assert_eq!(response.response, "Yes, I found 2 companies matching 'acme'.");
        assert_eq!(response.data, Some(two_companies()));

        let requests = crm.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, HttpMethod::Post);
        assert_eq!(requests[0].path, "/crm/v3/objects/companies/search");
    }

    #[tokio::test]
    async fn lookup_without_results_answers_no() {
        let crm = Arc::new(FakeCrm::returning(json!({"results": [], "total": 0})));
        let response = router(crm)
            .process_query(&QueryRequest::new("do we have a contact named jane"))
            .await
            .expect("response");

        assert_eq!(response.response, "No, I couldn't find any contacts matching 'jane'.");
    }

    #[tokio::test]
    async fn count_lists_and_summarizes_with_template() {
        let crm = Arc::new(FakeCrm::returning(two_companies()));
        let response = router(crm.clone())
            .process_query(&QueryRequest::new("how many companies"))
            .await
            .expect("response");

        assert_eq!(response.response, "Found 2 companies.");
        let request = &crm.requests()[0];
        assert_eq!(request.method, HttpMethod::Get);
        assert_eq!(request.path, "/crm/v3/objects/companies");
        assert_eq!(request.query_value("limit"), Some("25"));
    }

    #[tokio::test]
    async fn query_limit_is_clamped() {
        let crm = Arc::new(FakeCrm::returning(json!({"results": []})));
        router(crm.clone()).process_query(&QueryRequest::new("show 500 deals")).await.expect("response");

        assert_eq!(crm.requests()[0].query_value("limit"), Some("100"));
    }

    #[tokio::test]
    async fn overflowing_limit_clamps_to_maximum() {
        let crm = Arc::new(FakeCrm::returning(json!({"results": []})));
        router(crm.clone())
            .process_query(&QueryRequest::new("show 99999999999999999999 deals"))
            .await
            .expect("response");

        assert_eq!(crm.requests()[0].query_value("limit"), Some("100"));
    }

    #[tokio::test]
    async fn invalid_object_type_is_a_domain_error() {
        let crm = Arc::new(FakeCrm::returning(json!({"results": []})));
        let mut request = QueryRequest::new("show me everything");
        request.object_type = "Tickets".to_string();

        let error = router(crm.clone()).process_query(&request).await.expect_err("invalid type");

        assert!(error.is_domain());
        assert_eq!(
            error.user_message("processing your query"),
            "Invalid object_type: tickets. Must be one of: contacts, companies, deals"
        );
        assert!(crm.requests().is_empty());
    }

    #[tokio::test]
    async fn search_posts_free_text_with_classified_object_type() {
        let crm = Arc::new(FakeCrm::returning(json!({"results": [{"id": "7"}]})));
        let response = router(crm.clone())
            .search(&QueryRequest::new("find 3 deals about renewal"))
            .await
            .expect("response");

        assert_eq!(response.response, "Found 1 deals.");
        let request = &crm.requests()[0];
        assert_eq!(request.path, "/crm/v3/objects/deals/search");
        let body = request.body.clone().expect("search body");
        assert_eq!(body["query"], json!("find 3 deals about renewal"));
        assert_eq!(body["limit"], json!(3));
    }

    #[tokio::test]
    async fn crm_failure_surfaces_as_integration_error() {
        let crm = Arc::new(FakeCrm::failing(500));
        let error = router(crm)
            .search(&QueryRequest::new("acme"))
            .await
            .expect_err("crm failure");

        assert!(matches!(error, ApplicationError::Integration(_)));
        assert!(error.user_message("searching the CRM").starts_with("An error occurred while searching the CRM: "));
    }

    #[tokio::test]
    async fn fallback_search_renders_listing_for_lookup() {
        let crm = Arc::new(FakeCrm::returning(two_companies()));
        let answer = router(crm.clone())
            .natural_language_search("is there a company named acme")
            .await
            .expect("answer");

        assert_eq!(
            answer,
            "I found 2 companies matching 'acme':\n\
             - Acme (Domain: acme.io, Industry: Software)\n\
             - Acme Labs (Domain: No domain, Industry: Unknown industry)\n"
        );
        assert_eq!(crm.requests()[0].body.clone().expect("body")["limit"], json!(5));
    }

    #[tokio::test]
    async fn fallback_search_lists_known_object_type_for_count() {
        let crm = Arc::new(FakeCrm::returning(json!({"results": [
            {"id": "9", "properties": {"dealname": "Renewal", "amount": "1200", "dealstage": "closedwon"}}
        ]})));
        let answer = router(crm.clone()).natural_language_search("how many deals").await.expect("answer");

        assert_eq!(
            answer,
            "I found 1 deals:\n- Renewal (Amount: 1200, Stage: closedwon, Close date: No close date)\n"
        );
        assert_eq!(crm.requests()[0].path, "/crm/v3/objects/deals");
        assert_eq!(crm.requests()[0].query_value("limit"), Some("5"));
    }

    #[tokio::test]
    async fn fallback_search_asks_for_specifics_when_nothing_is_recognized() {
        let crm = Arc::new(FakeCrm::returning(json!({"results": []})));
        let answer = router(crm.clone()).natural_language_search("hello there").await.expect("answer");

        assert_eq!(answer, "I couldn't understand what you're looking for. Please try to be more specific.");
        assert!(crm.requests().is_empty());
    }
}
