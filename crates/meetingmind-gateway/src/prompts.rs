use crate::orchestrator::{AgentResult, AgentSpec};
use crate::request::ConsultationRequest;

pub const MEETING_SYSTEM_PROMPT: &str = r#"You are an expert meeting facilitator and business analyst.
Your task is to transform raw meeting notes into clear, structured, actionable output.

Reply with exactly four sections using these headings (in the language the notes are written in):

### ✅ Key Decisions
List the concrete decisions made during the meeting as bullet points.

### 🎯 Action Items
A table with columns: Task | Owner | Deadline. If no owner/deadline is mentioned, write "TBD".

### 📣 Slack Summary
A concise, ready-to-paste Slack message (max 4 bullet points). Start with a one-line headline.

### 📧 Follow-up Email Draft
A professional follow-up email to send to all participants. Include subject line.

Use crisp markdown formatting. Be specific and actionable, not vague.
"#;

pub const COORDINATOR_SYSTEM_PROMPT: &str = r#"You are the coordinator of a small team of meeting analysts.
Read the meeting notes and define exactly 3 specialist agents who will each analyse them from a different angle.

Reply with JSON only, no prose, in this shape:
{"agents":[{"name":"...","role":"...","focus":"..."},{"name":"...","role":"...","focus":"..."},{"name":"...","role":"...","focus":"..."}]}

"name" is a short identifier, "role" a one-line job title, "focus" what that agent must extract from the notes.
"#;

pub fn user_prompt_for(request: &ConsultationRequest) -> String {
    format!(
        "Please process these meeting notes:\n\nMeeting Topic: {}\nDate: {}\n\nRaw Notes:\n{}",
        request.topic, request.date, request.notes
    )
}

pub fn agent_system_prompt(agent: &AgentSpec) -> String {
    format!(
        "You are {}, {}.\nAnalyse the meeting notes strictly from this angle: {}\nBe concise and concrete. Use markdown bullet points.",
        agent.name, agent.role, agent.focus
    )
}

pub fn agent_user_prompt(request: &ConsultationRequest, agent: &AgentSpec) -> String {
    format!(
        "{}\n\nYour focus: {}",
        user_prompt_for(request),
        agent.focus
    )
}

/// Synthesis input: the original notes followed by every surviving analysis.
pub fn synthesis_user_prompt(request: &ConsultationRequest, results: &[AgentResult]) -> String {
    let mut prompt = user_prompt_for(request);
    prompt.push_str("\n\nSpecialist analyses:\n");
    for result in results {
        prompt.push_str(&format!(
            "\n## {} ({})\n{}\n",
            result.name,
            result.role,
            result.text.trim()
        ));
    }
    prompt.push_str("\nCombine these analyses into the final report.");
    prompt
}
