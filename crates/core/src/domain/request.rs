use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterOperator {
    ContainsToken,
    Eq,
}

/// One field-operator-value condition inside a filter group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilter {
    pub property_name: String,
    pub operator: FilterOperator,
    pub value: String,
}

impl SearchFilter {
    pub fn contains_token(property_name: &str, value: &str) -> Self {
        Self {
            property_name: property_name.to_string(),
            operator: FilterOperator::ContainsToken,
            value: value.to_string(),
        }
    }

    pub fn equals(property_name: &str, value: &str) -> Self {
        Self {
            property_name: property_name.to_string(),
            operator: FilterOperator::Eq,
            value: value.to_string(),
        }
    }
}

/// `filterGroups` payload: a single conjunction of the given filters.
pub fn filter_groups(filters: &[SearchFilter]) -> Value {
    json!([{ "filters": filters }])
}

/// A fully-resolved call against the CRM, independent of transport.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CrmRequest {
    pub method: HttpMethod,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl CrmRequest {
    pub fn get(path: impl Into<String>, query: Vec<(String, String)>) -> Self {
        Self { method: HttpMethod::Get, path: path.into(), query, body: None }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self { method: HttpMethod::Post, path: path.into(), query: Vec::new(), body: Some(body) }
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query.iter().find(|(name, _)| name == key).map(|(_, value)| value.as_str())
    }
}

/// Number of records in a CRM response envelope.
pub fn result_count(envelope: &Value) -> usize {
    envelope.get("results").and_then(Value::as_array).map(Vec::len).unwrap_or(0)
}

/// Records in a CRM response envelope; empty when absent.
pub fn results(envelope: &Value) -> &[Value] {
    envelope.get("results").and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[])
}
