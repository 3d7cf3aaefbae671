use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use hubrelay_agent::query::{QueryRequest, QueryResponse};
use hubrelay_agent::runtime::ChatRequest;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::bootstrap::AppState;
use crate::health;

pub const CORRELATION_HEADER: &str = "x-correlation-id";

#[derive(Debug, Serialize)]
struct WelcomeResponse {
    message: &'static str,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/query", post(query))
        .route("/search", post(search))
        .route("/chat", post(chat))
        .merge(health::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn root() -> Json<WelcomeResponse> {
    Json(WelcomeResponse { message: "Welcome to the HubRelay API Server" })
}

fn correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Errors never change the status code; the message goes in `response` and `data` is null.
async fn query(State(state): State<AppState>, Json(request): Json<QueryRequest>) -> impl IntoResponse {
    let correlation_id = correlation_id();
    let span = tracing::info_span!("http.query", correlation_id = %correlation_id);

    let response = async {
        info!(event_name = "http.query.received", object_type = %request.object_type, "query received");
        match state.router.process_query(&request).await {
            Ok(response) => response,
            Err(error) => {
                warn!(event_name = "http.query.failed", error = %error, "query failed");
                QueryResponse { response: error.user_message("processing your query"), data: None }
            }
        }
    }
    .instrument(span)
    .await;

    ([(CORRELATION_HEADER, correlation_id)], Json(response))
}

async fn search(State(state): State<AppState>, Json(request): Json<QueryRequest>) -> impl IntoResponse {
    let correlation_id = correlation_id();
    let span = tracing::info_span!("http.search", correlation_id = %correlation_id);

    let response = async {
        info!(event_name = "http.search.received", "search received");
        match state.router.search(&request).await {
            Ok(response) => response,
            Err(error) => {
                warn!(event_name = "http.search.failed", error = %error, "search failed");
                QueryResponse { response: error.user_message("searching the CRM"), data: None }
            }
        }
    }
    .instrument(span)
    .await;

    ([(CORRELATION_HEADER, correlation_id)], Json(response))
}

async fn chat(State(state): State<AppState>, Json(request): Json<ChatRequest>) -> impl IntoResponse {
    let correlation_id = correlation_id();
    let span = tracing::info_span!("http.chat", correlation_id = %correlation_id);

    let response = async {
        info!(
            event_name = "http.chat.received",
            has_conversation = request.conversation_id.is_some(),
            "chat message received"
        );
        state.agent.handle_chat(request).await
    }
    .instrument(span)
    .await;

    ([(CORRELATION_HEADER, correlation_id)], Json(response))
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use hubrelay_agent::runtime::AGENT_UNAVAILABLE_MESSAGE;
    use hubrelay_core::domain::request::CrmRequest;
    use hubrelay_crm::{CrmError, CrmGateway};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::{router, CORRELATION_HEADER};
    use crate::bootstrap::assemble;

    struct StubCrm {
        envelope: Value,
        paths: Mutex<Vec<String>>,
    }

    impl StubCrm {
        fn new(envelope: Value) -> Self {
            Self { envelope, paths: Mutex::new(Vec::new()) }
        }

        fn paths(&self) -> Vec<String> {
            self.paths.lock().expect("paths lock").clone()
        }
    }

    #[async_trait]
    impl CrmGateway for StubCrm {
        async fn execute(&self, request: &CrmRequest) -> Result<Value, CrmError> {
            self.paths.lock().expect("paths lock").push(request.path.clone());
            Ok(self.envelope.clone())
        }
    }

    fn app(crm: Arc<StubCrm>) -> axum::Router {
        router(assemble(crm, None, 5).expect("assemble state"))
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body bytes");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn root_and_health_respond() {
        let app = app(Arc::new(StubCrm::new(json!({"results": []}))));

        let root = app
            .clone()
            .oneshot(Request::builder().uri("/").body(Body::empty()).expect("request"))
            .await
            .expect("root");
        let health = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).expect("request"))
            .await
            .expect("health");

        assert_eq!(json_body(root).await["message"], json!("Welcome to the HubRelay API Server"));
        assert_eq!(json_body(health).await["status"], json!("healthy"));
    }

    #[tokio::test]
    async fn invalid_object_type_still_returns_ok() {
        let crm = Arc::new(StubCrm::new(json!({"results": []})));
        let response = app(crm.clone())
            .oneshot(post_json("/query", json!({"query": "show everything", "object_type": "tickets"})))
            .await
            .expect("query");

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(CORRELATION_HEADER));
        let body = json_body(response).await;
        assert_eq!(
            body,
            json!({
                "response": "Invalid object_type: tickets. Must be one of: contacts, companies, deals",
                "data": null,
            })
        );
        assert!(crm.paths().is_empty());
    }

    #[tokio::test]
    async fn search_with_invalid_object_type_still_returns_ok() {
        let crm = Arc::new(StubCrm::new(json!({"results": []})));
        let response = app(crm.clone())
            .oneshot(post_json("/search", json!({"query": "anything about renewals", "object_type": "tickets"})))
            .await
            .expect("search");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!({
                "response": "Invalid object_type: tickets. Must be one of: contacts, companies, deals",
                "data": null,
            })
        );
        assert!(crm.paths().is_empty());
    }

    #[tokio::test]
    async fn company_lookup_is_answered_from_the_crm() {
        let envelope = json!({"results": [{"id": "1", "properties": {"name": "Acme"}}], "total": 1});
        let crm = Arc::new(StubCrm::new(envelope.clone()));
        let response = app(crm.clone())
            .oneshot(post_json("/query", json!({"query": "is there a company named acme"})))
            .await
            .expect("query");

        let body = json_body(response).await;
        assert_eq!(body["response"], json!("Yes, I found 1 company matching 'acme'."));
        assert_eq!(body["data"], envelope);
        assert_eq!(crm.paths(), vec!["/crm/v3/objects/companies/search".to_string()]);
    }

    #[tokio::test]
    async fn search_summarizes_with_template() {
        let crm = Arc::new(StubCrm::new(json!({"results": [{"id": "7"}, {"id": "8"}]})));
        let response = app(crm.clone())
            .oneshot(post_json("/search", json!({"query": "deals about renewal"})))
            .await
            .expect("search");

        let body = json_body(response).await;
        assert_eq!(body["response"], json!("Found 2 deals."));
        assert_eq!(crm.paths(), vec!["/crm/v3/objects/deals/search".to_string()]);
    }

    #[tokio::test]
    async fn chat_without_model_returns_canned_message() {
        let app = app(Arc::new(StubCrm::new(json!({"results": []}))));

        let generated = app
            .clone()
            .oneshot(post_json("/chat", json!({"message": "hi"})))
            .await
            .expect("chat");
        let supplied = app
            .oneshot(post_json("/chat", json!({"message": "hi", "conversation_id": "sales-1"})))
            .await
            .expect("chat");

        let generated = json_body(generated).await;
        assert_eq!(generated["response"], json!(AGENT_UNAVAILABLE_MESSAGE));
        assert_eq!(generated["data"], Value::Null);
        assert!(generated["conversation_id"].as_str().is_some_and(|id| !id.is_empty()));
        assert_eq!(json_body(supplied).await["conversation_id"], json!("sales-1"));
    }

    #[tokio::test]
    async fn cors_allows_any_origin() {
        let app = app(Arc::new(StubCrm::new(json!({"results": []}))));
        let request = Request::builder()
            .uri("/health")
            .header(header::ORIGIN, "http://dashboard.local")
            .body(Body::empty())
            .expect("request");

        let response = app.oneshot(request).await.expect("health");

        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).and_then(|value| value.to_str().ok()),
            Some("*")
        );
    }
}
