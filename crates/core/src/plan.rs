//! Intent-to-request planning.
//!
//! Every call path that talks to the CRM (`/query`, `/search`, agent tools, the chat
//! fallback) goes through [`plan_request`].

use serde_json::{json, Value};

use crate::domain::intent::{Intent, IntentData};
use crate::domain::object_type::ObjectType;
use crate::domain::request::{filter_groups, CrmRequest, SearchFilter};
use crate::errors::DomainError;

pub const DEFAULT_LIMIT: i64 = 25;
pub const MIN_LIMIT: u32 = 1;
pub const MAX_LIMIT: u32 = 100;

pub fn clamp_limit(raw: i64) -> u32 {
    raw.clamp(i64::from(MIN_LIMIT), i64::from(MAX_LIMIT)) as u32
}

#[derive(Clone, Copy, Debug)]
pub struct PlanOptions<'a> {
    /// Used when the intent data carries no object type.
    pub default_object_type: &'a str,
    /// Used when the intent data carries no limit.
    pub default_limit: i64,
    /// Explicit property list; the object type's defaults apply otherwise.
    pub properties: Option<&'a [String]>,
    /// Free text for a `search` intent.
    pub free_text: Option<&'a str>,
}

impl Default for PlanOptions<'_> {
    fn default() -> Self {
        Self {
            default_object_type: ObjectType::Contacts.as_str(),
            default_limit: DEFAULT_LIMIT,
            properties: None,
            free_text: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlanShape {
    /// Filtered search for a named record.
    Lookup { subject: String },
    /// Filtered search on record attributes.
    FilteredSearch,
    /// Free-text search, optionally narrowed by filters.
    TextSearch,
    /// Plain object listing.
    List,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RequestPlan {
    pub intent: Intent,
    pub object_type: ObjectType,
    pub limit: u32,
    pub shape: PlanShape,
    pub request: CrmRequest,
}

pub fn resolve_object_type(data: &IntentData, fallback: &str) -> Result<ObjectType, DomainError> {
    let raw = data.object_type.as_deref().unwrap_or(fallback);
    raw.to_lowercase().parse()
}

pub fn resolve_limit(data: &IntentData, fallback: i64) -> u32 {
    clamp_limit(data.limit.unwrap_or(fallback))
}

/// Filters an intent implies for the given object type.
pub fn derive_filters(
    intent: Intent,
    object_type: ObjectType,
    data: &IntentData,
) -> Vec<SearchFilter> {
    let mut filters = Vec::new();

    match intent {
        Intent::Lookup => match (object_type, &data.company_name, &data.contact_name) {
            (ObjectType::Companies, Some(company_name), _) => {
                filters.push(SearchFilter::contains_token("name", company_name));
            }
            (ObjectType::Contacts, _, Some(contact_name)) => {
                filters.push(SearchFilter::contains_token("firstname", contact_name));
            }
            _ => {}
        },
        Intent::Filter => {
            if let (ObjectType::Companies, Some(industry)) = (object_type, &data.industry) {
                filters.push(SearchFilter::contains_token("industry", industry));
            }
            if let (ObjectType::Contacts, Some(email)) = (object_type, &data.email) {
                filters.push(SearchFilter::contains_token("email", email));
            }
        }
        Intent::Search => match object_type {
            ObjectType::Contacts => {
                if let Some(email) = &data.email {
                    filters.push(SearchFilter::contains_token("email", email));
                }
            }
            ObjectType::Companies => {
                if let Some(domain) = &data.domain {
                    filters.push(SearchFilter::contains_token("domain", domain));
                }
            }
            ObjectType::Deals => {
                if let Some(stage) = &data.deal_stage {
                    filters.push(SearchFilter::equals("dealstage", stage));
                }
            }
        },
        Intent::List | Intent::Count => {}
    }

    filters
}

/// Builds the CRM request for an intent.
///
/// Lookup and filter intents search only when at least one filter applies; a search
/// intent needs free text. Everything else lists.
pub fn plan_request(
    intent: Intent,
    data: &IntentData,
    options: PlanOptions<'_>,
) -> Result<RequestPlan, DomainError> {
    let object_type = resolve_object_type(data, options.default_object_type)?;
    let limit = resolve_limit(data, options.default_limit);
    let properties = match options.properties {
        Some(explicit) if !explicit.is_empty() => explicit.to_vec(),
        _ => object_type.default_properties().iter().map(|name| name.to_string()).collect(),
    };
    let filters = derive_filters(intent, object_type, data);
    let free_text = options.free_text.map(str::trim).filter(|text| !text.is_empty());

    let (shape, request) = match (intent, free_text) {
        (Intent::Lookup, _) if !filters.is_empty() => {
            let subject = filters[0].value.clone();
            let body = search_body(&filters, limit, &properties);
            (PlanShape::Lookup { subject }, CrmRequest::post(object_type.search_path(), body))
        }
        (Intent::Filter, _) if !filters.is_empty() => {
            let body = search_body(&filters, limit, &properties);
            (PlanShape::FilteredSearch, CrmRequest::post(object_type.search_path(), body))
        }
        (Intent::Search, Some(text)) => {
            let mut body = json!({ "query": text, "limit": limit, "properties": properties });
            if !filters.is_empty() {
                body["filterGroups"] = filter_groups(&filters);
            }
            (PlanShape::TextSearch, CrmRequest::post(object_type.search_path(), body))
        }
        _ => {
            let query = vec![
                ("limit".to_string(), limit.to_string()),
                ("archived".to_string(), "false".to_string()),
                ("properties".to_string(), properties.join(",")),
            ];
            (PlanShape::List, CrmRequest::get(object_type.list_path(), query))
        }
    };

    Ok(RequestPlan { intent, object_type, limit, shape, request })
}

fn search_body(filters: &[SearchFilter], limit: u32, properties: &[String]) -> Value {
    json!({
        "filterGroups": filter_groups(filters),
        "limit": limit,
        "properties": properties,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{clamp_limit, plan_request, PlanOptions, PlanShape};
    use crate::domain::intent::{Intent, IntentData};
    use crate::domain::object_type::ObjectType;
    use crate::domain::request::HttpMethod;
    use crate::errors::DomainError;

    fn data(value: serde_json::Value) -> IntentData {
        serde_json::from_value(value).expect("intent data fixture")
    }

    #[test]
    fn limits_are_clamped_into_range() {
        assert_eq!(clamp_limit(50), 50);
        assert_eq!(clamp_limit(500), 100);
        assert_eq!(clamp_limit(0), 1);
        assert_eq!(clamp_limit(-7), 1);
    }

    #[test]
    fn company_lookup_builds_name_search() {
        let plan = plan_request(
            Intent::Lookup,
            &data(json!({"object_type": "companies", "company_name": "acme"})),
            PlanOptions::default(),
        )
        .expect("plan");

        assert_eq!(plan.object_type, ObjectType::Companies);
        assert_eq!(plan.shape, PlanShape::Lookup { subject: "acme".to_string() });
        assert_eq!(plan.request.method, HttpMethod::Post);
        assert_eq!(plan.request.path, "/crm/v3/objects/companies/search");

        let body = plan.request.body.expect("search body");
        assert_eq!(
            body["filterGroups"],
            json!([{ "filters": [
                { "propertyName": "name", "operator": "CONTAINS_TOKEN", "value": "acme" }
            ]}])
        );
        assert_eq!(body["limit"], json!(25));
    }

    #[test]
    fn contact_lookup_matches_first_name() {
        let plan = plan_request(
            Intent::Lookup,
            &data(json!({"object_type": "contacts", "contact_name": "jane"})),
            PlanOptions::default(),
        )
        .expect("plan");

        let body = plan.request.body.expect("search body");
        assert_eq!(body["filterGroups"][0]["filters"][0]["propertyName"], json!("firstname"));
    }

    #[test]
    fn lookup_without_applicable_filter_lists_instead() {
        // Company name given but routed to contacts: no filter applies.
        let plan = plan_request(
            Intent::Lookup,
            &data(json!({"object_type": "contacts", "company_name": "acme"})),
            PlanOptions::default(),
        )
        .expect("plan");

        assert_eq!(plan.shape, PlanShape::List);
        assert_eq!(plan.request.method, HttpMethod::Get);
        assert_eq!(plan.request.path, "/crm/v3/objects/contacts");
    }

    #[test]
    fn filter_intent_combines_attribute_filters() {
        let plan = plan_request(
            Intent::Filter,
            &data(json!({"object_type": "companies", "industry": "software", "email": "x"})),
            PlanOptions::default(),
        )
        .expect("plan");

        assert_eq!(plan.shape, PlanShape::FilteredSearch);
        let body = plan.request.body.expect("search body");
        let filters = body["filterGroups"][0]["filters"].as_array().expect("filters").clone();
        assert_eq!(filters.len(), 1);
        assert_eq!(filters[0]["propertyName"], json!("industry"));
    }

    #[test]
    fn list_uses_default_properties_and_archived_flag() {
        let plan = plan_request(Intent::List, &IntentData::default(), PlanOptions {
            default_object_type: "Deals",
            default_limit: 10,
            ..PlanOptions::default()
        })
        .expect("plan");

        assert_eq!(plan.object_type, ObjectType::Deals);
        assert_eq!(plan.request.query_value("limit"), Some("10"));
        assert_eq!(plan.request.query_value("archived"), Some("false"));
        assert_eq!(
            plan.request.query_value("properties"),
            Some("dealname,amount,dealstage,closedate,pipeline")
        );
    }

    #[test]
    fn explicit_properties_and_intent_limit_win() {
        let properties = vec!["email".to_string()];
        let plan = plan_request(Intent::Count, &data(json!({"limit": 250})), PlanOptions {
            default_limit: 5,
            properties: Some(&properties),
            ..PlanOptions::default()
        })
        .expect("plan");

        assert_eq!(plan.limit, 100);
        assert_eq!(plan.request.query_value("properties"), Some("email"));
    }

    #[test]
    fn search_with_free_text_posts_query_and_hint_filters() {
        let plan = plan_request(
            Intent::Search,
            &data(json!({"object_type": "deals", "deal_stage": "closed_won"})),
            PlanOptions { free_text: Some("deals closed won"), ..PlanOptions::default() },
        )
        .expect("plan");

        assert_eq!(plan.shape, PlanShape::TextSearch);
        let body = plan.request.body.expect("search body");
        assert_eq!(body["query"], json!("deals closed won"));
        assert_eq!(body["filterGroups"][0]["filters"][0]["operator"], json!("EQ"));
    }

    #[test]
    fn search_without_free_text_lists() {
        let plan = plan_request(Intent::Search, &IntentData::default(), PlanOptions::default())
            .expect("plan");
        assert_eq!(plan.shape, PlanShape::List);
    }

    #[test]
    fn unknown_object_type_is_rejected() {
        let error = plan_request(
            Intent::List,
            &IntentData::default(),
            PlanOptions { default_object_type: "tickets", ..PlanOptions::default() },
        )
        .expect_err("tickets are not routable");

        assert_eq!(error, DomainError::InvalidObjectType("tickets".to_string()));
    }
}
