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

const DEFAULT_GOOGLE_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const LABEL: &str = "Google";

struct GoogleGenerativeAiProvider {
    api_key: Option<String>,
    base_url: String,
    client: Client,
}

impl Provider for GoogleGenerativeAiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Google
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn generate(&self, request: GenerateRequest) -> ProviderFuture<'_, DeltaStream> {
        Box::pin(async move {
            let Some(api_key) = self.api_key.as_deref() else {
                return Err(missing_api_key(LABEL, ProviderKind::Google.api_key_envs()));
            };

            let endpoint = build_google_endpoint(&self.base_url, &request.model_id);
            let payload = build_google_payload(&request);
            debug!(model = %request.model_id, "google streamGenerateContent");

            let response = send_checked(
                LABEL,
                self.client
                    .post(endpoint.as_str())
                    .header("Content-Type", "application/json")
                    .header("x-goog-api-key", api_key)
                    .json(&payload),
            )
            .await?;

            Ok(sse_delta_stream(LABEL, response, parse_google_chunk))
        })
    }
}

pub(super) fn provider(config: ProviderConfig) -> ProviderRef {
    let base_url = config
        .base_url
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_GOOGLE_BASE_URL.to_string());
    Arc::new(GoogleGenerativeAiProvider {
        api_key: config.api_key.filter(|key| !key.trim().is_empty()),
        client: build_http_client(&base_url),
        base_url,
    })
}

fn build_google_payload(request: &GenerateRequest) -> Value {
    let mut payload = json!({
        "contents": [{
            "role": "user",
            "parts": [{ "text": request.prompt }],
        }],
    });

    if let Some(system_instruction) = &request.system_instruction {
        payload["systemInstruction"] = json!({
            "parts": [{ "text": system_instruction }],
        });
    }

    payload
}

/// Maps one `streamGenerateContent` chunk to deltas.
///
/// Parts flagged `thought` are thinking; every other text part is text.
/// Chunks carrying only usage metadata or a finish reason produce nothing.
fn parse_google_chunk(chunk: &Value) -> Result<Vec<RawDelta>, AiError> {
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

    let Some(candidates) = chunk.get("candidates") else {
        if chunk.get("usageMetadata").is_some() || chunk.get("promptFeedback").is_some() {
            return Ok(Vec::new());
        }
        return Err(malformed(LABEL, "missing candidates"));
    };
    let Some(candidate) = candidates.as_array().and_then(|items| items.first()) else {
        return Err(malformed(LABEL, "has no candidate"));
    };

    let Some(parts) = candidate
        .get("content")
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
    else {
        return Ok(Vec::new());
    };

    let deltas = parts
        .iter()
        .filter_map(|part| {
            let text = part.get("text").and_then(Value::as_str)?;
            let is_thought = part
                .get("thought")
                .or_else(|| part.get("isThought"))
                .and_then(Value::as_bool)
                .unwrap_or(false);
            Some(if is_thought {
                RawDelta::thinking(text)
            } else {
                RawDelta::text(text)
            })
        })
        .collect();
    Ok(deltas)
}

fn build_google_endpoint(base_url: &str, model_id: &str) -> String {
    join_url(base_url, &build_google_model_path(model_id))
}

fn build_google_model_path(model_id: &str) -> String {
    let trimmed = model_id.trim().trim_start_matches('/');
    let without_suffix = trimmed
        .strip_suffix(":streamGenerateContent")
        .or_else(|| trimmed.strip_suffix(":generateContent"))
        .unwrap_or(trimmed);

    if without_suffix.starts_with("models/") || without_suffix.contains("/models/") {
        format!("{without_suffix}:streamGenerateContent?alt=sse")
    } else {
        format!("models/{without_suffix}:streamGenerateContent?alt=sse")
    }
}
