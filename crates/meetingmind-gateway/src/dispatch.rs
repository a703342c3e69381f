use meetingmind_ai::{GenerateRequest, ProviderKind, ProviderRef, ProviderRegistry};
use tracing::{info, warn};

use crate::catalog::{ModelCatalog, ORCHESTRATOR_MODEL_ID};
use crate::config::{OrchestratorSettings, RelayConfig};
use crate::error::RelayError;
use crate::events::{EventStream, InternalEvent};
use crate::orchestrator::{ModelBinding, Orchestrator, OrchestratorConfig};
use crate::prompts;
use crate::request::ConsultationRequest;
use crate::single_call::run_single_call;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    SingleCall,
    Orchestrator,
}

pub fn select_mode(model_id: &str) -> ExecutionMode {
    if model_id == ORCHESTRATOR_MODEL_ID {
        ExecutionMode::Orchestrator
    } else {
        ExecutionMode::SingleCall
    }
}

/// Routes consultation requests to a single call or the orchestrator.
pub struct Relay {
    registry: ProviderRegistry,
    catalog: ModelCatalog,
    default_model: String,
    orchestrator: OrchestratorSettings,
}

impl Relay {
    pub fn new(
        registry: ProviderRegistry,
        catalog: ModelCatalog,
        default_model: impl Into<String>,
        orchestrator: OrchestratorSettings,
    ) -> Self {
        Self {
            registry,
            catalog,
            default_model: default_model.into(),
            orchestrator,
        }
    }

    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(
            ProviderRegistry::from_configs(&config.providers, config.upstream_timeout),
            config.catalog.clone(),
            config.default_model.clone(),
            config.orchestrator.clone(),
        )
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    pub fn resolve_model<'a>(&'a self, request: &'a ConsultationRequest) -> &'a str {
        request.requested_model().unwrap_or(&self.default_model)
    }

    pub fn display_name(&self, model_id: &str) -> String {
        self.catalog.display_name(model_id)
    }

    /// Produces the event stream for `request`.
    ///
    /// Credentials are checked before anything runs; a missing key or an
    /// unroutable model yields a single `Error` event and no upstream call.
    pub fn dispatch(&self, request: ConsultationRequest) -> EventStream {
        let model_id = self.resolve_model(&request).to_string();
        let mode = select_mode(&model_id);
        info!(model = %model_id, ?mode, "dispatching consultation");

        let prepared = match mode {
            ExecutionMode::SingleCall => self.binding_for(&model_id).map(|binding| {
                let call = GenerateRequest::new(binding.model_id, prompts::user_prompt_for(&request))
                    .with_system_instruction(prompts::MEETING_SYSTEM_PROMPT);
                run_single_call(binding.provider, call)
            }),
            ExecutionMode::Orchestrator => self.orchestrator_config().map(|config| {
                Orchestrator::new(config).run(request)
            }),
        };

        match prepared {
            Ok(events) => events,
            Err(error) => {
                warn!(model = %model_id, kind = error.kind(), "request rejected before dispatch: {error}");
                single_error(error)
            }
        }
    }

    fn binding_for(&self, model_id: &str) -> Result<ModelBinding, RelayError> {
        let kind = self
            .catalog
            .provider_for(model_id)
            .ok_or_else(|| RelayError::configuration(format!("Unknown model '{model_id}'.")))?;
        Ok(ModelBinding::new(self.configured_provider(kind)?, model_id))
    }

    fn configured_provider(&self, kind: ProviderKind) -> Result<ProviderRef, RelayError> {
        let provider = self.registry.get(kind).ok_or_else(|| {
            RelayError::configuration(format!("No provider registered for '{kind}'."))
        })?;
        if !self.registry.is_configured(kind) {
            let env = kind.api_key_envs().first().copied().unwrap_or("API key");
            return Err(RelayError::configuration(format!("{env} is missing.")));
        }
        Ok(provider)
    }

    fn orchestrator_config(&self) -> Result<OrchestratorConfig, RelayError> {
        let settings = &self.orchestrator;
        for model_id in [
            &settings.coordinator_model,
            &settings.agent_model,
            &settings.synthesis_model,
        ] {
            if select_mode(model_id) == ExecutionMode::Orchestrator {
                return Err(RelayError::configuration(
                    "The orchestrator cannot use itself as a backing model.",
                ));
            }
        }
        Ok(OrchestratorConfig {
            coordinator: self.binding_for(&settings.coordinator_model)?,
            agent: self.binding_for(&settings.agent_model)?,
            synthesis: self.binding_for(&settings.synthesis_model)?,
            failure_policy: settings.failure_policy,
        })
    }
}

fn single_error(error: RelayError) -> EventStream {
    Box::pin(futures_util::stream::iter([InternalEvent::error(
        error.to_string(),
    )]))
}
