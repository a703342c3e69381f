use serde::Deserialize;

/// Inbound consultation body. Field names differ between deployments, so the
/// legacy spellings are accepted as aliases.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConsultationRequest {
    #[serde(alias = "patient_name")]
    pub topic: String,
    #[serde(rename = "meeting_date", alias = "date_of_visit", alias = "date")]
    pub date: String,
    pub notes: String,
    #[serde(default)]
    pub model: Option<String>,
}

impl ConsultationRequest {
    /// The requested model id, or `None` when the configured default applies.
    pub fn requested_model(&self) -> Option<&str> {
        self.model
            .as_deref()
            .map(str::trim)
            .filter(|model| !model.is_empty() && !model.eq_ignore_ascii_case("default"))
    }
}
