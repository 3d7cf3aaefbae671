//! Natural-language access to CRM data.
//!
//! Two surfaces share one planner (`hubrelay_core::plan`):
//! - [`query::QueryRouter`] answers one-shot questions (`/query`, `/search`) and the
//!   plain-text fallback search;
//! - [`runtime::AgentRuntime`] runs a tool-calling chat loop over the three CRM tools,
//!   with history kept per conversation id.
//!
//! The model only chooses tools and phrases answers. Request construction, limits and
//! object-type validation stay deterministic.

pub mod classifier;
pub mod conversation;
pub mod guardrails;
pub mod llm;
pub mod prompts;
pub mod query;
pub mod runtime;
pub mod summarizer;
pub mod tools;

#[cfg(test)]
mod testing;
