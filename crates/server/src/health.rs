use axum::{routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub checked_at: String,
}

pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/health", get(health))
}

/// Liveness only; the CRM and model are not probed.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy", checked_at: Utc::now().to_rfc3339() })
}
