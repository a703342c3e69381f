use meetingmind_ai::AiError;
use thiserror::Error;

/// Failures surfaced by the relay.
///
/// `Configuration` and `Authentication` are detected before any frame is
/// written. `Upstream` and `Orchestration` become one terminal stream event.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("{0}")]
    Configuration(String),
    #[error("{0}")]
    Authentication(String),
    #[error(transparent)]
    Upstream(#[from] AiError),
    #[error("Orchestration failed: {0}")]
    Orchestration(String),
}

impl RelayError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication(message.into())
    }

    pub fn orchestration(message: impl Into<String>) -> Self {
        Self::Orchestration(message.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::Configuration(_) => "configuration",
            RelayError::Authentication(_) => "authentication",
            RelayError::Upstream(_) => "upstream",
            RelayError::Orchestration(_) => "orchestration",
        }
    }
}
