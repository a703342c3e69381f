use std::pin::Pin;

use futures_util::Stream;
use meetingmind_ai::{DeltaKind, RawDelta};
use serde::{Deserialize, Serialize};

/// Ordered, lazily produced events for one request.
pub type EventStream = Pin<Box<dyn Stream<Item = InternalEvent> + Send>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InternalEvent {
    Status(String),
    Thinking(String),
    Text(String),
    AgentStart { agent: String, role: String },
    AgentText { agent: String, text: String },
    /// Reasoning produced inside an agent block.
    AgentThinking { agent: String, text: String },
    AgentDone { agent: String },
    Error(String),
}

impl InternalEvent {
    pub fn status(message: impl Into<String>) -> Self {
        Self::Status(message.into())
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, InternalEvent::Error(_))
    }

    /// Maps one adapter delta to the matching top-level event.
    pub fn from_delta(delta: RawDelta) -> Self {
        match delta.kind {
            DeltaKind::Thinking => Self::Thinking(delta.text),
            DeltaKind::Text => Self::Text(delta.text),
        }
    }

    pub fn wire_type(&self) -> WireEventType {
        match self {
            InternalEvent::Status(_) => WireEventType::Status,
            InternalEvent::Thinking(_) => WireEventType::Thinking,
            InternalEvent::Text(_) => WireEventType::Text,
            InternalEvent::AgentStart { .. } => WireEventType::AgentStart,
            InternalEvent::AgentText { .. } => WireEventType::AgentText,
            InternalEvent::AgentThinking { .. } => WireEventType::Thinking,
            InternalEvent::AgentDone { .. } => WireEventType::AgentDone,
            InternalEvent::Error(_) => WireEventType::Error,
        }
    }

    /// Structured payload placed after `data: `.
    ///
    /// `agent_start` carries the role in both `role` and `content`;
    /// `agent_done` has empty content.
    pub fn to_wire(&self) -> WirePayload<'_> {
        let (content, agent, role) = match self {
            InternalEvent::Status(content)
            | InternalEvent::Thinking(content)
            | InternalEvent::Text(content)
            | InternalEvent::Error(content) => (content.as_str(), None, None),
            InternalEvent::AgentStart { agent, role } => {
                (role.as_str(), Some(agent.as_str()), Some(role.as_str()))
            }
            InternalEvent::AgentText { agent, text }
            | InternalEvent::AgentThinking { agent, text } => {
                (text.as_str(), Some(agent.as_str()), None)
            }
            InternalEvent::AgentDone { agent } => ("", Some(agent.as_str()), None),
        };
        WirePayload {
            event_type: self.wire_type(),
            content,
            agent,
            role,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireEventType {
    Text,
    Thinking,
    Status,
    AgentStart,
    AgentText,
    AgentDone,
    Error,
}

#[derive(Debug, Serialize)]
pub struct WirePayload<'a> {
    #[serde(rename = "type")]
    pub event_type: WireEventType,
    pub content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<&'a str>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_payload_omits_agent_fields() {
        let event = InternalEvent::text("### Key Decisions\n");
        let json = serde_json::to_string(&event.to_wire()).expect("serialize");
        assert_eq!(json, r####"{"type":"text","content":"### Key Decisions\n"}"####);
    }

    #[test]
    fn agent_events_carry_agent_and_role() {
        let start = InternalEvent::AgentStart {
            agent: "Analyst".to_string(),
            role: "Decision analyst".to_string(),
        };
        let value = serde_json::to_value(start.to_wire()).expect("serialize");
        assert_eq!(value["type"], "agent_start");
        assert_eq!(value["agent"], "Analyst");
        assert_eq!(value["role"], "Decision analyst");

        let done = InternalEvent::AgentDone {
            agent: "Analyst".to_string(),
        };
        let value = serde_json::to_value(done.to_wire()).expect("serialize");
        assert_eq!(value["type"], "agent_done");
        assert_eq!(value["content"], "");
        assert!(value.get("role").is_none());
    }

    #[test]
    fn agent_thinking_is_thinking_tagged_with_the_agent() {
        let event = InternalEvent::AgentThinking {
            agent: "Tasker".to_string(),
            text: "who owns QA?".to_string(),
        };
        let value = serde_json::to_value(event.to_wire()).expect("serialize");
        assert_eq!(
            value,
            serde_json::json!({ "type": "thinking", "content": "who owns QA?", "agent": "Tasker" })
        );
    }

    #[test]
    fn deltas_map_by_kind() {
        assert_eq!(
            InternalEvent::from_delta(RawDelta::thinking("hmm")),
            InternalEvent::Thinking("hmm".to_string())
        );
        assert_eq!(
            InternalEvent::from_delta(RawDelta::text("ok")),
            InternalEvent::Text("ok".to_string())
        );
    }
}
