use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

pub const CONTACT_PROPERTIES: [&str; 5] = ["firstname", "lastname", "email", "phone", "company"];
pub const COMPANY_PROPERTIES: [&str; 5] = ["name", "domain", "industry", "website", "phone"];
pub const DEAL_PROPERTIES: [&str; 5] = ["dealname", "amount", "dealstage", "closedate", "pipeline"];

/// CRM record category. Only these three are routable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    Contacts,
    Companies,
    Deals,
}

impl ObjectType {
    pub const ALL: [ObjectType; 3] = [Self::Contacts, Self::Companies, Self::Deals];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contacts => "contacts",
            Self::Companies => "companies",
            Self::Deals => "deals",
        }
    }

    pub fn singular(&self) -> &'static str {
        match self {
            Self::Contacts => "contact",
            Self::Companies => "company",
            Self::Deals => "deal",
        }
    }

    /// Noun agreeing with `count`.
    pub fn noun_for(&self, count: usize) -> &'static str {
        if count == 1 {
            self.singular()
        } else {
            self.as_str()
        }
    }

    pub fn default_properties(&self) -> &'static [&'static str] {
        match self {
            Self::Contacts => &CONTACT_PROPERTIES,
            Self::Companies => &COMPANY_PROPERTIES,
            Self::Deals => &DEAL_PROPERTIES,
        }
    }

    pub fn list_path(&self) -> String {
        format!("/crm/v3/objects/{}", self.as_str())
    }

    pub fn search_path(&self) -> String {
        format!("/crm/v3/objects/{}/search", self.as_str())
    }

    pub fn tool_name(&self) -> &'static str {
        match self {
            Self::Contacts => "get_contacts",
            Self::Companies => "get_companies",
            Self::Deals => "get_deals",
        }
    }

    /// Infers an object type from a free-text mention (`contact`, `compan`, `deal`).
    pub fn infer_from_text(normalized_text: &str) -> Option<Self> {
        if normalized_text.contains("contact") {
            Some(Self::Contacts)
        } else if normalized_text.contains("compan") {
            Some(Self::Companies)
        } else if normalized_text.contains("deal") {
            Some(Self::Deals)
        } else {
            None
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectType {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "contacts" => Ok(Self::Contacts),
            "companies" => Ok(Self::Companies),
            "deals" => Ok(Self::Deals),
            _ => Err(DomainError::InvalidObjectType(value.to_string())),
        }
    }
}
