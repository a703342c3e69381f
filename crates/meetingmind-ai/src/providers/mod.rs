use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::ProviderRef;
use crate::types::{ProviderConfig, ProviderKind};

mod common;
mod deadline;
mod google_generative_ai;
mod openai_completions;

pub use deadline::DeadlineProvider;

/// Explicit provider factory: one adapter per kind, built once per process.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderKind, ProviderRef>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the builtin adapters. Kinds missing from `configs` are still
    /// registered, unconfigured, so callers can report missing credentials.
    pub fn from_configs(
        configs: &HashMap<ProviderKind, ProviderConfig>,
        timeout: Option<Duration>,
    ) -> Self {
        let mut registry = Self::new();
        for kind in ProviderKind::ALL {
            let config = configs.get(&kind).cloned().unwrap_or_default();
            let provider: ProviderRef = match kind {
                ProviderKind::Google => google_generative_ai::provider(config),
                ProviderKind::OpenAi => openai_completions::provider(config),
            };
            registry.register(provider, timeout);
        }
        registry
    }

    pub fn register(&mut self, provider: ProviderRef, timeout: Option<Duration>) {
        let kind = provider.kind();
        let provider = match timeout {
            Some(timeout) => Arc::new(DeadlineProvider::wrap(provider, timeout)) as ProviderRef,
            None => provider,
        };
        self.providers.insert(kind, provider);
    }

    pub fn get(&self, kind: ProviderKind) -> Option<ProviderRef> {
        self.providers.get(&kind).cloned()
    }

    pub fn is_configured(&self, kind: ProviderKind) -> bool {
        self.providers
            .get(&kind)
            .is_some_and(|provider| provider.is_configured())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_configs_registers_every_kind() {
        let mut configs = HashMap::new();
        configs.insert(
            ProviderKind::Google,
            ProviderConfig {
                api_key: Some("AIza-test".to_string()),
                base_url: None,
            },
        );
        let registry = ProviderRegistry::from_configs(&configs, None);

        assert!(registry.get(ProviderKind::Google).is_some());
        assert!(registry.get(ProviderKind::OpenAi).is_some());
        assert!(registry.is_configured(ProviderKind::Google));
        assert!(!registry.is_configured(ProviderKind::OpenAi));
    }
}
