use std::sync::Arc;

use reqwest::Client;
use serde_json::{Value, json};
use tracing::debug;

use super::common::{
    build_http_client, join_url, malformed, missing_api_key, send_checked, sse_delta_stream,
};
use crate::error::{AiError, AiErrorCode};
use crate::provider::{Provider, ProviderFuture, ProviderRef};
use crate::stream::DeltaStream;
use crate::types::{GenerateRequest, ProviderConfig, ProviderKind, RawDelta};

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const LABEL: &str = "OpenAI";

struct OpenAiCompletionsProvider {
    api_key: Option<String>,
    base_url: String,
    client: Client,
}

impl Provider for OpenAiCompletionsProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn generate(&self, request: GenerateRequest) -> ProviderFuture<'_, DeltaStream> {
        Box::pin(async move {
            let Some(api_key) = self.api_key.as_deref() else {
                return Err(missing_api_key(LABEL, ProviderKind::OpenAi.api_key_envs()));
            };

            let endpoint = join_url(&self.base_url, "chat/completions");
            let payload = build_openai_payload(&request);
            debug!(model = %request.model_id, "openai chat/completions");

            let response = send_checked(
                LABEL,
                self.client
                    .post(endpoint.as_str())
                    .header("Authorization", format!("Bearer {api_key}"))
                    .header("Content-Type", "application/json")
                    .json(&payload),
            )
            .await?;

            Ok(sse_delta_stream(LABEL, response, parse_openai_chunk))
        })
    }
}

pub(super) fn provider(config: ProviderConfig) -> ProviderRef {
    let base_url = config
        .base_url
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string());
    Arc::new(OpenAiCompletionsProvider {
        api_key: config.api_key.filter(|key| !key.trim().is_empty()),
        client: build_http_client(&base_url),
        base_url,
    })
}

fn build_openai_payload(request: &GenerateRequest) -> Value {
    let mut messages = Vec::new();
    if let Some(system_instruction) = &request.system_instruction {
        messages.push(json!({
            "role": "system",
            "content": system_instruction,
        }));
    }
    messages.push(json!({
        "role": "user",
        "content": request.prompt,
    }));

    json!({
        "model": request.model_id,
        "stream": true,
        "messages": messages,
    })
}

/// Maps one chat-completions chunk to deltas.
///
/// `reasoning_content` (or `reasoning`) is thinking, `content` is text.
/// Trailing usage chunks arrive with an empty `choices` array.
fn parse_openai_chunk(chunk: &Value) -> Result<Vec<RawDelta>, AiError> {
    if let Some(error) = chunk.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Err(AiError::new(
            AiErrorCode::ProviderHttp,
            format!("{LABEL} stream error: {message}"),
        ));
    }

    let Some(choices) = chunk.get("choices").and_then(Value::as_array) else {
        return Err(malformed(LABEL, "missing choices"));
    };
    let Some(choice) = choices.first() else {
        return Ok(Vec::new());
    };
    let Some(delta) = choice.get("delta").and_then(Value::as_object) else {
        if choice.get("finish_reason").is_some() {
            return Ok(Vec::new());
        }
        return Err(malformed(LABEL, "missing choices[0].delta"));
    };

    let mut deltas = Vec::new();
    if let Some(reasoning) = delta
        .get("reasoning_content")
        .or_else(|| delta.get("reasoning"))
        .and_then(Value::as_str)
    {
        deltas.push(RawDelta::thinking(reasoning));
    }
    if let Some(content) = delta.get("content").and_then(Value::as_str) {
        deltas.push(RawDelta::text(content));
    }
    Ok(deltas)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_and_reasoning_are_split() {
        let chunk = json!({
            "choices": [{
                "index": 0,
                "delta": { "reasoning_content": "checking owners", "content": "- Ship v2\n" }
            }]
        });
        assert_eq!(
            parse_openai_chunk(&chunk).expect("chunk should parse"),
            vec![
                RawDelta::thinking("checking owners"),
                RawDelta::text("- Ship v2\n"),
            ]
        );
    }

    #[test]
    fn role_only_and_usage_chunks_are_empty() {
        let role_only = json!({ "choices": [{ "delta": { "role": "assistant" } }] });
        let usage = json!({ "choices": [], "usage": { "prompt_tokens": 3 } });
        assert!(parse_openai_chunk(&role_only).expect("role chunk").is_empty());
        assert!(parse_openai_chunk(&usage).expect("usage chunk").is_empty());
    }

    #[test]
    fn null_content_is_skipped() {
        let chunk = json!({ "choices": [{ "delta": { "content": null }, "finish_reason": "stop" }] });
        assert!(parse_openai_chunk(&chunk).expect("final chunk").is_empty());
    }

    #[test]
    fn chunk_without_choices_is_malformed() {
        let error = parse_openai_chunk(&json!({ "id": "x" })).expect_err("malformed");
        assert_eq!(error.code, AiErrorCode::MalformedDelta);
    }

    #[test]
    fn payload_places_system_prompt_first() {
        let request =
            GenerateRequest::new("gpt-4o-mini", "notes").with_system_instruction("facilitator");
        let payload = build_openai_payload(&request);
        assert_eq!(payload["stream"], true);
        assert_eq!(payload["messages"][0]["role"], "system");
        assert_eq!(payload["messages"][1]["content"], "notes");
    }

    #[tokio::test]
    async fn missing_key_fails_before_network() {
        let provider = provider(ProviderConfig::default());
        assert!(!provider.is_configured());
        let error = match provider
            .generate(GenerateRequest::new("gpt-4o-mini", "hi"))
            .await
        {
            Ok(_) => panic!("generate should fail without a key"),
            Err(error) => error,
        };
        assert_eq!(error.code, AiErrorCode::ProviderAuthMissing);
        assert_eq!(error.message, "OPENAI_API_KEY is missing.");
    }
}
