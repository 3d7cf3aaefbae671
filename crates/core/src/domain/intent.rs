use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    #[default]
    List,
    Lookup,
    Search,
    Count,
    Filter,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Lookup => "lookup",
            Self::Search => "search",
            Self::Count => "count",
            Self::Filter => "filter",
        }
    }

    /// Maps a model-supplied tag onto an intent. Unknown tags degrade to `List`.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "lookup" => Self::Lookup,
            "search" => Self::Search,
            "count" => Self::Count,
            "filter" => Self::Filter,
            _ => Self::List,
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters extracted alongside an intent.
///
/// Keys the router understands are typed; anything else a model returns is kept in
/// `extra` so it still shows up in logs.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IntentData {
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_text")]
    pub object_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_text")]
    pub company_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_text")]
    pub contact_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_text")]
    pub industry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_text")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_text")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_text")]
    pub deal_stage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_limit")]
    pub limit: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl IntentData {
    pub fn is_empty(&self) -> bool {
        self.object_type.is_none()
            && self.company_name.is_none()
            && self.contact_name.is_none()
            && self.industry.is_none()
            && self.email.is_none()
            && self.domain.is_none()
            && self.deal_stage.is_none()
            && self.limit.is_none()
            && self.extra.is_empty()
    }

    /// The name a lookup is about, company first.
    pub fn lookup_subject(&self) -> Option<&str> {
        self.company_name.as_deref().or(self.contact_name.as_deref())
    }
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(text)) => {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Some(Value::Number(number)) => Some(number.to_string()),
        _ => None,
    })
}

fn lenient_limit<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(number)) => {
            number.as_i64().or_else(|| number.as_f64().map(|float| float as i64))
        }
        Some(Value::String(text)) => text.trim().parse::<i64>().ok(),
        _ => None,
    })
}
