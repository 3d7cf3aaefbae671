use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid object_type: {0}. Must be one of: contacts, companies, deals")]
    InvalidObjectType(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("integration failure: {0}")]
    Integration(String),
}

impl ApplicationError {
    /// Text returned to the caller in place of an error status.
    ///
    /// Domain violations are reported verbatim; everything else is wrapped with the
    /// operation that failed, e.g. `"processing your query"`.
    pub fn user_message(&self, operation: &str) -> String {
        match self {
            Self::Domain(error) => error.to_string(),
            Self::Integration(_) => {
                format!("An error occurred while {operation}: {self}")
            }
        }
    }

    pub fn is_domain(&self) -> bool {
        matches!(self, Self::Domain(_))
    }
}
