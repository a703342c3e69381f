use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiErrorCode {
    ProviderAuthMissing,
    ProviderHttp,
    ProviderTransport,
    ProviderTimeout,
    /// One undecodable chunk. Adapters log and skip these; they never end a stream.
    MalformedDelta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiError {
    pub code: AiErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl AiError {
    pub fn new(code: AiErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl Display for AiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for AiError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_the_bare_message() {
        let error = AiError::new(AiErrorCode::ProviderHttp, "OpenAI HTTP 429: slow down")
            .with_details(serde_json::json!({ "status": 429 }));
        assert_eq!(error.to_string(), "OpenAI HTTP 429: slow down");
    }

    #[test]
    fn codes_serialize_as_snake_case() {
        let value = serde_json::to_value(AiError::new(AiErrorCode::ProviderTimeout, "slow"))
            .expect("serialize");
        assert_eq!(value, serde_json::json!({ "code": "provider_timeout", "message": "slow" }));
    }
}
