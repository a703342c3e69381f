use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeltaKind {
    Thinking,
    Text,
}

/// One normalized fragment of model output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDelta {
    pub kind: DeltaKind,
    pub text: String,
}

impl RawDelta {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: DeltaKind::Text,
            text: text.into(),
        }
    }

    pub fn thinking(text: impl Into<String>) -> Self {
        Self {
            kind: DeltaKind::Thinking,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Google,
    OpenAi,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::Google, ProviderKind::OpenAi];

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Google => "google",
            ProviderKind::OpenAi => "openai",
        }
    }

    /// Environment variables consulted for this provider's key, in order.
    pub fn api_key_envs(self) -> &'static [&'static str] {
        match self {
            ProviderKind::Google => &["GOOGLE_API_KEY", "GEMINI_API_KEY"],
            ProviderKind::OpenAi => &["OPENAI_API_KEY"],
        }
    }

    /// Best-effort guess for model ids that are not in a catalog.
    pub fn infer(model_id: &str) -> Option<Self> {
        let id = model_id.trim().trim_start_matches("models/").to_ascii_lowercase();
        if id.starts_with("gemini") || id.starts_with("gemma") {
            return Some(ProviderKind::Google);
        }
        let is_openai_reasoning = ["o1", "o3", "o4"]
            .iter()
            .any(|prefix| id == *prefix || id.starts_with(&format!("{prefix}-")));
        if id.starts_with("gpt") || id.starts_with("chatgpt") || is_openai_reasoning {
            return Some(ProviderKind::OpenAi);
        }
        None
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct GenerateRequest {
    pub model_id: String,
    pub system_instruction: Option<String>,
    pub prompt: String,
}

impl GenerateRequest {
    pub fn new(model_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn with_system_instruction(mut self, system_instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(system_instruction.into());
        self
    }
}

/// Credentials and endpoint for one provider, read once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

impl ProviderConfig {
    pub fn has_api_key(&self) -> bool {
        self.api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty())
    }
}
