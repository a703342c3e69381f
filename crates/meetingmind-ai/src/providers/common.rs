use futures_util::StreamExt;
use reqwest::{Client, Response};
use serde_json::{Value, json};
use tracing::warn;

use crate::error::{AiError, AiErrorCode};
use crate::stream::DeltaStream;
use crate::types::RawDelta;

pub(super) fn join_url(base_url: &str, path: &str) -> String {
    if base_url.ends_with('/') {
        format!("{base_url}{path}")
    } else {
        format!("{base_url}/{path}")
    }
}

/// One client per adapter, built at construction time and reused for every call.
pub(super) fn build_http_client(base_url: &str) -> Client {
    if is_loopback_base_url(base_url) {
        Client::builder()
            .no_proxy()
            .build()
            .unwrap_or_else(|_| Client::new())
    } else {
        Client::new()
    }
}

pub(super) fn is_loopback_base_url(base_url: &str) -> bool {
    let Ok(url) = reqwest::Url::parse(base_url) else {
        return false;
    };
    let Some(host) = url.host_str() else {
        return false;
    };
    host.eq_ignore_ascii_case("localhost") || host == "127.0.0.1" || host == "::1"
}

pub(super) fn missing_api_key(label: &str, envs: &[&str]) -> AiError {
    AiError::new(
        AiErrorCode::ProviderAuthMissing,
        format!("{} is missing.", envs.first().copied().unwrap_or(label)),
    )
    .with_details(json!({ "provider": label, "envs": envs }))
}

/// Sends `request` and turns transport failures and non-success statuses into errors.
pub(super) async fn send_checked(
    label: &str,
    request: reqwest::RequestBuilder,
) -> Result<Response, AiError> {
    let response = request.send().await.map_err(|error| {
        AiError::new(
            AiErrorCode::ProviderTransport,
            format!("{label} transport failed: {error}"),
        )
    })?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "unable to read error body".to_string());
        return Err(AiError::new(
            AiErrorCode::ProviderHttp,
            format!("{label} HTTP {status}: {}", extract_error_message(&body)),
        )
        .with_details(json!({
            "status": status,
            "bodyPrefix": truncate_for_details(&body, 800),
        })));
    }

    Ok(response)
}

/// Pulls `error.message` out of a provider error body, falling back to the raw text.
pub(super) fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            let error = value.get("error")?;
            error
                .get("message")
                .and_then(Value::as_str)
                .or_else(|| error.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| truncate_for_details(body.trim(), 400))
}

/// Decodes the parsed chunks of an SSE response body into deltas.
///
/// `parse_chunk` returns the deltas carried by one `data:` payload. A
/// `MalformedDelta` error from it is logged and the chunk skipped; any other
/// error is yielded and ends the stream.
pub(super) fn sse_delta_stream<F>(
    label: &'static str,
    response: Response,
    mut parse_chunk: F,
) -> DeltaStream
where
    F: FnMut(&Value) -> Result<Vec<RawDelta>, AiError> + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut body = response.bytes_stream();
        let mut decoder = SseDecoder::default();
        let mut pending = Vec::new();

        'read: loop {
            let eof = match body.next().await {
                Some(Ok(bytes)) => {
                    pending.extend(decoder.push(&bytes));
                    false
                }
                Some(Err(error)) => {
                    yield Err(AiError::new(
                        AiErrorCode::ProviderTransport,
                        format!("{label} stream read failed: {error}"),
                    ));
                    break 'read;
                }
                None => {
                    pending.extend(decoder.finish());
                    true
                }
            };

            for data in pending.drain(..) {
                if data == "[DONE]" {
                    break 'read;
                }
                match decode_chunk(label, &data, &mut parse_chunk) {
                    Ok(deltas) => {
                        for delta in deltas {
                            yield Ok(delta);
                        }
                    }
                    Err(error) => {
                        yield Err(error);
                        break 'read;
                    }
                }
            }

            if eof {
                break;
            }
        }
    })
}

fn decode_chunk<F>(label: &str, data: &str, parse_chunk: &mut F) -> Result<Vec<RawDelta>, AiError>
where
    F: FnMut(&Value) -> Result<Vec<RawDelta>, AiError>,
{
    let parsed = serde_json::from_str::<Value>(data)
        .map_err(|error| {
            AiError::new(
                AiErrorCode::MalformedDelta,
                format!("invalid {label} chunk JSON: {error}"),
            )
        })
        .and_then(|value| parse_chunk(&value));

    match parsed {
        Ok(deltas) => Ok(deltas
            .into_iter()
            .filter(|delta| !delta.text.is_empty())
            .collect()),
        Err(error) if error.code == AiErrorCode::MalformedDelta => {
            warn!(
                provider = label,
                chunk = %truncate_for_details(data, 200),
                "skipping malformed delta: {}",
                error.message
            );
            Ok(Vec::new())
        }
        Err(error) => Err(error),
    }
}

pub(super) fn malformed(label: &str, reason: &str) -> AiError {
    AiError::new(AiErrorCode::MalformedDelta, format!("{label} chunk {reason}"))
}

/// Incremental `text/event-stream` decoder yielding joined `data:` payloads.
#[derive(Default)]
pub(super) struct SseDecoder {
    pending: Vec<u8>,
    data_lines: Vec<String>,
}

impl SseDecoder {
    pub(super) fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(position) = self.pending.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=position).collect();
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = self.accept_line(&line) {
                events.push(event);
            }
        }
        events
    }

    pub(super) fn finish(&mut self) -> Option<String> {
        if !self.pending.is_empty() {
            let line = std::mem::take(&mut self.pending);
            let line = String::from_utf8_lossy(&line).into_owned();
            if let Some(event) = self.accept_line(&line) {
                return Some(event);
            }
        }
        self.flush()
    }

    fn accept_line(&mut self, line: &str) -> Option<String> {
        let trimmed = line.trim_end_matches(&['\r', '\n'][..]);
        if trimmed.is_empty() {
            return self.flush();
        }
        if let Some(data) = trimmed.strip_prefix("data:") {
            self.data_lines.push(data.trim_start().to_string());
        }
        None
    }

    fn flush(&mut self) -> Option<String> {
        if self.data_lines.is_empty() {
            return None;
        }
        let data = self.data_lines.join("\n");
        self.data_lines.clear();
        Some(data)
    }
}

pub(super) fn truncate_for_details(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    if limit <= 3 {
        return ".".repeat(limit);
    }
    let prefix: String = text.chars().take(limit - 3).collect();
    format!("{prefix}...")
}
