use std::str::FromStr;

use futures_util::StreamExt;
use meetingmind_ai::{DeltaKind, GenerateRequest, ProviderRef};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::RelayError;
use crate::events::{EventStream, InternalEvent};
use crate::prompts;
use crate::request::ConsultationRequest;

pub const AGENT_COUNT: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AgentSpec {
    pub name: String,
    pub role: String,
    pub focus: String,
}

impl AgentSpec {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("agent name cannot be empty".to_string());
        }
        if self.role.trim().is_empty() {
            return Err(format!("agent '{}' has an empty role", self.name));
        }
        if self.focus.trim().is_empty() {
            return Err(format!("agent '{}' has an empty focus", self.name));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentResult {
    pub name: String,
    pub role: String,
    pub text: String,
}

/// What happens to the run when one agent's upstream call fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentFailurePolicy {
    /// Close the failed agent, report it, and synthesize from the survivors.
    #[default]
    Degrade,
    /// Abort the whole run on the first agent failure.
    FailFast,
}

impl FromStr for AgentFailurePolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "degrade" => Ok(AgentFailurePolicy::Degrade),
            "fail_fast" => Ok(AgentFailurePolicy::FailFast),
            other => Err(format!(
                "unsupported failure_policy '{other}' (expected 'degrade' or 'fail_fast')"
            )),
        }
    }
}

/// A provider paired with the model id it is called with.
#[derive(Clone)]
pub struct ModelBinding {
    pub provider: ProviderRef,
    pub model_id: String,
}

impl ModelBinding {
    pub fn new(provider: ProviderRef, model_id: impl Into<String>) -> Self {
        Self {
            provider,
            model_id: model_id.into(),
        }
    }

    fn request(&self, system_instruction: String, prompt: String) -> GenerateRequest {
        GenerateRequest::new(self.model_id.clone(), prompt).with_system_instruction(system_instruction)
    }
}

#[derive(Clone)]
pub struct OrchestratorConfig {
    pub coordinator: ModelBinding,
    pub agent: ModelBinding,
    pub synthesis: ModelBinding,
    pub failure_policy: AgentFailurePolicy,
}

/// Coordinator call, three sequential agent calls, then one synthesis call.
#[derive(Clone)]
pub struct Orchestrator {
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self { config }
    }

    pub fn run(self, request: ConsultationRequest) -> EventStream {
        Box::pin(async_stream::stream! {
            let config = self.config;

            let agents = match coordinate(&config.coordinator, &request).await {
                Ok(agents) => agents,
                Err(failure) => {
                    error!(kind = failure.kind(), "coordinator failed: {failure}");
                    yield InternalEvent::error(as_orchestration_failure(failure).to_string());
                    return;
                }
            };
            let roles = agents
                .iter()
                .map(|agent| format!("{} ({})", agent.name, agent.role))
                .collect::<Vec<_>>()
                .join(", ");
            info!(agents = %roles, "agents assembled");
            yield InternalEvent::status(format!("Assembled {} agents: {roles}", agents.len()));

            let mut results: Vec<AgentResult> = Vec::with_capacity(agents.len());
            for agent in &agents {
                yield InternalEvent::AgentStart {
                    agent: agent.name.clone(),
                    role: agent.role.clone(),
                };

                let call = config.agent.request(
                    prompts::agent_system_prompt(agent),
                    prompts::agent_user_prompt(&request, agent),
                );
                let mut text = String::new();
                let mut failure: Option<RelayError> = None;
                match config.agent.provider.generate(call).await {
                    Ok(mut deltas) => {
                        while let Some(delta) = deltas.next().await {
                            match delta {
                                Ok(delta) if delta.kind == DeltaKind::Thinking => {
                                    yield InternalEvent::AgentThinking {
                                        agent: agent.name.clone(),
                                        text: delta.text,
                                    };
                                }
                                Ok(delta) => {
                                    text.push_str(&delta.text);
                                    yield InternalEvent::AgentText {
                                        agent: agent.name.clone(),
                                        text: delta.text,
                                    };
                                }
                                Err(error) => {
                                    failure = Some(error.into());
                                    break;
                                }
                            }
                        }
                    }
                    Err(error) => failure = Some(error.into()),
                }

                match failure {
                    None => {
                        yield InternalEvent::AgentDone { agent: agent.name.clone() };
                        results.push(AgentResult {
                            name: agent.name.clone(),
                            role: agent.role.clone(),
                            text,
                        });
                    }
                    Some(failure) => match config.failure_policy {
                        AgentFailurePolicy::FailFast => {
                            error!(agent = %agent.name, "agent failed, aborting run: {failure}");
                            yield InternalEvent::error(
                                RelayError::orchestration(format!("agent '{}' failed: {failure}", agent.name)).to_string(),
                            );
                            return;
                        }
                        AgentFailurePolicy::Degrade => {
                            warn!(agent = %agent.name, "agent failed, continuing without it: {failure}");
                            yield InternalEvent::AgentDone { agent: agent.name.clone() };
                            yield InternalEvent::status(format!(
                                "Agent {} failed ({failure}); continuing with the remaining agents",
                                agent.name
                            ));
                        }
                    },
                }
            }

            if results.is_empty() {
                error!("every agent failed");
                yield InternalEvent::error(
                    RelayError::orchestration("no agent produced output").to_string(),
                );
                return;
            }

            yield InternalEvent::status("Synthesizing final report...");
            let call = config.synthesis.request(
                prompts::MEETING_SYSTEM_PROMPT.to_string(),
                prompts::synthesis_user_prompt(&request, &results),
            );
            let mut deltas = match config.synthesis.provider.generate(call).await {
                Ok(deltas) => deltas,
                Err(failure) => {
                    error!("synthesis failed: {failure}");
                    yield InternalEvent::error(
                        as_orchestration_failure(failure.into()).to_string(),
                    );
                    return;
                }
            };
            while let Some(delta) = deltas.next().await {
                match delta {
                    Ok(delta) => yield InternalEvent::from_delta(delta),
                    Err(failure) => {
                        error!("synthesis stream failed: {failure}");
                        yield InternalEvent::error(
                            as_orchestration_failure(failure.into()).to_string(),
                        );
                        break;
                    }
                }
            }
        })
    }
}

async fn coordinate(
    coordinator: &ModelBinding,
    request: &ConsultationRequest,
) -> Result<Vec<AgentSpec>, RelayError> {
    let reply = coordinator
        .provider
        .complete(coordinator.request(
            prompts::COORDINATOR_SYSTEM_PROMPT.to_string(),
            prompts::user_prompt_for(request),
        ))
        .await?;
    parse_agent_specs(&reply)
}

fn as_orchestration_failure(failure: RelayError) -> RelayError {
    match failure {
        RelayError::Orchestration(_) => failure,
        other => RelayError::Orchestration(other.to_string()),
    }
}

#[derive(Debug, Deserialize)]
struct CoordinatorPlan {
    agents: Vec<AgentSpec>,
}

/// Parses the coordinator reply into exactly [`AGENT_COUNT`] agents.
///
/// Markdown code fences and prose around the JSON object are tolerated.
pub fn parse_agent_specs(reply: &str) -> Result<Vec<AgentSpec>, RelayError> {
    let body = extract_json_object(reply)
        .ok_or_else(|| RelayError::orchestration("coordinator reply contains no JSON object"))?;
    let plan: CoordinatorPlan = serde_json::from_str(body).map_err(|error| {
        RelayError::orchestration(format!("invalid coordinator JSON: {error}"))
    })?;
    if plan.agents.len() != AGENT_COUNT {
        return Err(RelayError::orchestration(format!(
            "coordinator defined {} agents, expected {AGENT_COUNT}",
            plan.agents.len()
        )));
    }
    for agent in &plan.agents {
        agent.validate().map_err(RelayError::orchestration)?;
    }
    Ok(plan
        .agents
        .into_iter()
        .map(|agent| AgentSpec {
            name: agent.name.trim().to_string(),
            role: agent.role.trim().to_string(),
            focus: agent.focus.trim().to_string(),
        })
        .collect())
}

fn extract_json_object(reply: &str) -> Option<&str> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    (end > start).then(|| &reply[start..=end])
}
