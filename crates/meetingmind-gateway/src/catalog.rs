use meetingmind_ai::ProviderKind;
use serde_json::{Map, Value};

pub const ORCHESTRATOR_MODEL_ID: &str = "multi-agent-orchestrator";
pub const DEFAULT_MODEL_ID: &str = "gemini-2.5-flash-lite";

const BUILTIN_MODELS: &[(&str, &str, Option<ProviderKind>)] = &[
    (
        "gemini-2.5-flash-lite",
        "Gemini 2.5 Flash-Lite",
        Some(ProviderKind::Google),
    ),
    ("gpt-4o-mini", "GPT-4o Mini", Some(ProviderKind::OpenAi)),
    (ORCHESTRATOR_MODEL_ID, "Multi-Agent Orchestrator", None),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelEntry {
    pub id: String,
    pub display_name: String,
    /// `None` only for the orchestrator pseudo-model.
    pub provider: Option<ProviderKind>,
}

/// Model ids offered to clients, their display names, and the provider
/// serving each one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelCatalog {
    entries: Vec<ModelEntry>,
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ModelCatalog {
    pub fn builtin() -> Self {
        Self {
            entries: BUILTIN_MODELS
                .iter()
                .map(|(id, display_name, provider)| ModelEntry {
                    id: (*id).to_string(),
                    display_name: (*display_name).to_string(),
                    provider: *provider,
                })
                .collect(),
        }
    }

    /// Adds or renames a model. The provider is inferred from the id.
    pub fn insert(&mut self, id: &str, display_name: &str) {
        let id = id.trim();
        if id.is_empty() {
            return;
        }
        let display_name = match display_name.trim() {
            "" => id,
            name => name,
        };
        if let Some(existing) = self.entries.iter_mut().find(|entry| entry.id == id) {
            existing.display_name = display_name.to_string();
            return;
        }
        self.entries.push(ModelEntry {
            id: id.to_string(),
            display_name: display_name.to_string(),
            provider: ProviderKind::infer(id),
        });
    }

    pub fn entries(&self) -> &[ModelEntry] {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<&ModelEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn display_name(&self, id: &str) -> String {
        self.get(id)
            .map(|entry| entry.display_name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    /// Provider for `id`: the catalog entry first, then inference from the id.
    pub fn provider_for(&self, id: &str) -> Option<ProviderKind> {
        match self.get(id) {
            Some(entry) => entry.provider,
            None => ProviderKind::infer(id),
        }
    }

    pub fn to_json(&self) -> Value {
        let models = self
            .entries
            .iter()
            .map(|entry| (entry.id.clone(), Value::String(entry.display_name.clone())))
            .collect::<Map<String, Value>>();
        Value::Object(models)
    }
}
