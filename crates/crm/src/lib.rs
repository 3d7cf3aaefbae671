//! HTTP access to the CRM object API.
//!
//! The relay reads three object types (contacts, companies, deals) through two request
//! shapes: a paginated list (`GET /crm/v3/objects/{type}`) and a filtered search
//! (`POST /crm/v3/objects/{type}/search`). Request construction lives in
//! `hubrelay_core::plan`; this crate only executes requests and normalizes failures.

pub mod client;

pub use client::{CrmAuth, CrmClient, CrmError, CrmGateway};
