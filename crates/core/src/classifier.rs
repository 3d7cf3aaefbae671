//! Deterministic intent classification for CRM questions.
//!
//! The rule-based path is the floor every other classifier degrades to: it never fails
//! and always produces an intent, defaulting to `list` with an empty parameter bag.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::intent::{Intent, IntentData};
use crate::domain::object_type::ObjectType;

const LOOKUP_PHRASES: [&str; 6] = ["is there", "do we have", "do you have", "exists", "named", "called"];
const SEARCH_PHRASES: [&str; 5] = ["find", "search", "look for", "where", "who has"];
const COUNT_PHRASES: [&str; 3] = ["how many", "count", "total number"];
const FILTER_PHRASES: [&str; 4] = ["filter", "only", "with", "that have"];

const DEAL_STAGE_PHRASES: [(&str, &str); 4] = [
    ("closed won", "closed_won"),
    ("closed lost", "closed_lost"),
    ("negotiation", "negotiation"),
    ("proposal", "proposal"),
];

static COMPANY_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"company(?:\s+named|\s+called)?\s+([\w\s&-]+)").expect("valid company regex")
});
static CONTACT_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"contact(?:\s+named|\s+called)?\s+([\w\s&-]+)").expect("valid contact regex")
});
static INDUSTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"industry(?:\s+is)?\s+([\w\s&-]+)").expect("valid industry regex")
});
static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"email(?:\s+contains)?\s+([\w@.]+)").expect("valid email regex")
});
static LIMIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([0-9]+)\s+(?:contacts|companies|deals)").expect("valid limit regex")
});
static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(.+?)\s*```").expect("valid fenced block regex")
});

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedQuery {
    pub intent: Intent,
    #[serde(rename = "intent_data")]
    pub data: IntentData,
}

#[derive(Clone, Debug, Default)]
pub struct RuleBasedClassifier;

impl RuleBasedClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, query: &str) -> ClassifiedQuery {
        let normalized = query.to_lowercase();
        let intent = select_intent(&normalized);
        let mut data = IntentData::default();

        if intent == Intent::Lookup {
            if let Some(company_name) = capture(&COMPANY_NAME, &normalized) {
                data.company_name = Some(company_name);
                data.object_type = Some(ObjectType::Companies.as_str().to_string());
            }
            if let Some(contact_name) = capture(&CONTACT_NAME, &normalized) {
                data.contact_name = Some(contact_name);
                data.object_type = Some(ObjectType::Contacts.as_str().to_string());
            }
        }

        data.industry = capture(&INDUSTRY, &normalized);
        data.email = capture(&EMAIL, &normalized);
        // The capture is ASCII digits only, so a parse failure means overflow.
        data.limit = capture(&LIMIT, &normalized).map(|raw| raw.parse::<i64>().unwrap_or(i64::MAX));

        if data.object_type.is_none() {
            data.object_type =
                ObjectType::infer_from_text(&normalized).map(|kind| kind.as_str().to_string());
        }

        ClassifiedQuery { intent, data }
    }

    /// Filter hints for a free-text tool search scoped to one object type.
    pub fn tool_hints(&self, object_type: ObjectType, query: &str) -> IntentData {
        let normalized = query.to_lowercase();
        let mut data = IntentData {
            object_type: Some(object_type.as_str().to_string()),
            ..IntentData::default()
        };

        match object_type {
            ObjectType::Contacts => {
                data.email = token_containing(query, |token| token.contains('@'));
            }
            ObjectType::Companies => {
                data.domain = token_containing(query, |token| {
                    let lowered = token.to_lowercase();
                    [".com", ".org", ".net"].iter().any(|suffix| lowered.contains(suffix))
                });
            }
            ObjectType::Deals => {
                data.deal_stage = DEAL_STAGE_PHRASES
                    .iter()
                    .find(|(phrase, _)| normalized.contains(phrase))
                    .map(|(_, stage)| (*stage).to_string());
            }
        }

        data
    }
}

fn select_intent(normalized: &str) -> Intent {
    let matches_any = |phrases: &[&str]| phrases.iter().any(|phrase| normalized.contains(phrase));

    if matches_any(&LOOKUP_PHRASES) {
        Intent::Lookup
    } else if matches_any(&SEARCH_PHRASES) {
        Intent::Search
    } else if matches_any(&COUNT_PHRASES) {
        Intent::Count
    } else if matches_any(&FILTER_PHRASES) {
        Intent::Filter
    } else {
        Intent::List
    }
}

fn capture(pattern: &Regex, text: &str) -> Option<String> {
    let captured = pattern.captures(text)?.get(1)?.as_str().trim();
    (!captured.is_empty()).then(|| captured.to_string())
}

fn token_containing(query: &str, predicate: impl Fn(&str) -> bool) -> Option<String> {
    query
        .split_whitespace()
        .map(|token| token.trim_matches(|c: char| matches!(c, ',' | '?' | '!' | ';' | '"' | '\'')))
        .map(|token| token.trim_end_matches('.'))
        .find(|token| !token.is_empty() && predicate(token))
        .map(str::to_string)
}

/// Pulls the JSON object out of a model reply.
///
/// A fenced block wins; otherwise everything before the first `{` and after the last
/// `}` is dropped.
pub fn extract_json_block(reply: &str) -> Option<&str> {
    if let Some(block) = FENCED_BLOCK.captures(reply).and_then(|captures| captures.get(1)) {
        return Some(block.as_str().trim());
    }

    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    (end > start).then(|| &reply[start..=end])
}

/// Parses a model's `{"intent": ..., "intent_data": {...}}` reply.
///
/// Returns `None` when the reply holds no parseable JSON object, which callers treat as
/// a signal to fall back to [`RuleBasedClassifier`].
pub fn parse_model_reply(reply: &str) -> Option<ClassifiedQuery> {
    let raw = extract_json_block(reply)?;
    let value: Value = serde_json::from_str(raw).ok()?;
    let object = value.as_object()?;

    let intent = object.get("intent").and_then(Value::as_str).map(Intent::parse_lenient);
    let data = match object.get("intent_data") {
        Some(Value::Null) | None => IntentData::default(),
        Some(raw_data) => serde_json::from_value::<IntentData>(raw_data.clone()).ok()?,
    };

    Some(ClassifiedQuery { intent: intent.unwrap_or_default(), data })
}
