//! Human-readable renderings of CRM results.

use serde_json::{json, Map, Value};

use crate::domain::object_type::ObjectType;
use crate::domain::request::results;

pub const UNCLEAR_QUERY_MESSAGE: &str =
    "I couldn't understand what you're looking for. Please try to be more specific.";

/// Yes/no answer for a lookup.
pub fn lookup_message(object_type: ObjectType, subject: &str, count: usize) -> String {
    if count > 0 {
        format!("Yes, I found {count} {} matching '{subject}'.", object_type.noun_for(count))
    } else {
        format!("No, I couldn't find any {object_type} matching '{subject}'.")
    }
}

pub fn filter_message(object_type: ObjectType, count: usize) -> String {
    format!("Found {count} {object_type} matching your filter criteria.")
}

pub fn found_message(object_type: ObjectType, count: usize) -> String {
    format!("Found {count} {object_type}.")
}

/// Bullet list of records, used by the non-agent chat path.
pub fn render_listing(object_type: ObjectType, envelope: &Value, subject: Option<&str>) -> String {
    let records = results(envelope);
    if records.is_empty() {
        return match subject {
            Some(subject) => format!("I couldn't find any {object_type} matching '{subject}'."),
            None => format!("I couldn't find any {object_type} matching your criteria."),
        };
    }

    let mut rendered = match subject {
        Some(subject) => {
            format!("I found {} {object_type} matching '{subject}':\n", records.len())
        }
        None => format!("I found {} {object_type}:\n", records.len()),
    };
    for record in records {
        rendered.push_str(&render_line(object_type, properties(record)));
        rendered.push('\n');
    }
    rendered
}

fn render_line(object_type: ObjectType, props: &Map<String, Value>) -> String {
    match object_type {
        ObjectType::Contacts => format!(
            "- {} ({}, {}, {})",
            full_name(props),
            text_or(props, "email", "No email"),
            text_or(props, "company", ""),
            text_or(props, "phone", "No phone"),
        ),
        ObjectType::Companies => format!(
            "- {} (Domain: {}, Industry: {})",
            text_or(props, "name", "Unknown"),
            text_or(props, "domain", "No domain"),
            text_or(props, "industry", "Unknown industry"),
        ),
        ObjectType::Deals => format!(
            "- {} (Amount: {}, Stage: {}, Close date: {})",
            text_or(props, "dealname", "Unnamed deal"),
            text_or(props, "amount", "Unknown amount"),
            text_or(props, "dealstage", "Unknown stage"),
            text_or(props, "closedate", "No close date"),
        ),
    }
}

/// Compact per-type projection of a CRM envelope, handed back to the model as a tool
/// result.
pub fn compact_records(object_type: ObjectType, envelope: &Value) -> Value {
    let records = results(envelope);
    let key = object_type.as_str();
    if records.is_empty() {
        return json!({
            "count": 0,
            key: [],
            "message": format!("No {object_type} found"),
        });
    }

    let compacted = records
        .iter()
        .map(|record| {
            let props = properties(record);
            let id = record.get("id").cloned().unwrap_or(Value::Null);
            match object_type {
                ObjectType::Contacts => json!({
                    "id": id,
                    "name": full_name(props),
                    "email": text_or(props, "email", ""),
                    "phone": text_or(props, "phone", ""),
                    "company": text_or(props, "company", ""),
                }),
                ObjectType::Companies => json!({
                    "id": id,
                    "name": text_or(props, "name", ""),
                    "domain": text_or(props, "domain", ""),
                    "industry": text_or(props, "industry", ""),
                    "website": text_or(props, "website", ""),
                }),
                ObjectType::Deals => json!({
                    "id": id,
                    "name": text_or(props, "dealname", ""),
                    "amount": text_or(props, "amount", ""),
                    "stage": text_or(props, "dealstage", ""),
                    "close_date": text_or(props, "closedate", ""),
                }),
            }
        })
        .collect::<Vec<_>>();

    json!({ "count": compacted.len(), key: compacted })
}

static EMPTY_PROPERTIES: std::sync::LazyLock<Map<String, Value>> =
    std::sync::LazyLock::new(Map::new);

fn properties(record: &Value) -> &Map<String, Value> {
    record.get("properties").and_then(Value::as_object).unwrap_or(&EMPTY_PROPERTIES)
}

fn text_or(props: &Map<String, Value>, key: &str, fallback: &str) -> String {
    match props.get(key) {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Number(number)) => number.to_string(),
        Some(Value::Bool(flag)) => flag.to_string(),
        _ => fallback.to_string(),
    }
}

fn full_name(props: &Map<String, Value>) -> String {
    format!("{} {}", text_or(props, "firstname", ""), text_or(props, "lastname", ""))
        .trim()
        .to_string()
}
