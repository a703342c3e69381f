use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;

use futures_util::StreamExt;
use meetingmind_ai::{
    AiErrorCode, GenerateRequest, ProviderConfig, ProviderKind, ProviderRegistry, RawDelta,
};

struct FixtureServer {
    base_url: String,
    requests: mpsc::Receiver<String>,
}

fn spawn_server(status_line: &'static str, content_type: &'static str, body: String) -> FixtureServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind local test server");
    let address = listener.local_addr().expect("server local addr");
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        if let Ok((mut socket, _)) = listener.accept() {
            socket
                .set_read_timeout(Some(Duration::from_secs(2)))
                .expect("set read timeout");
            let _ = tx.send(read_request(&mut socket));

            let response = format!(
                "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            socket
                .write_all(response.as_bytes())
                .expect("write response");
            let _ = socket.flush();
        }
    });

    FixtureServer {
        base_url: format!("http://{address}"),
        requests: rx,
    }
}

fn read_request(socket: &mut impl Read) -> String {
    let mut received = Vec::new();
    let mut buffer = [0_u8; 8192];
    loop {
        let read = match socket.read(&mut buffer) {
            Ok(0) | Err(_) => break,
            Ok(read) => read,
        };
        received.extend_from_slice(&buffer[..read]);
        let text = String::from_utf8_lossy(&received);
        let Some(header_end) = text.find("\r\n\r\n") else {
            continue;
        };
        let content_length = text[..header_end]
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        if received.len() >= header_end + 4 + content_length {
            break;
        }
    }
    String::from_utf8_lossy(&received).into_owned()
}

fn spawn_sse_server(events: &[&str]) -> FixtureServer {
    let body = events
        .iter()
        .map(|event| format!("data: {event}\n\n"))
        .collect::<String>();
    spawn_server("HTTP/1.1 200 OK", "text/event-stream", body)
}

fn registry_for(kind: ProviderKind, base_url: &str) -> ProviderRegistry {
    let mut configs = HashMap::new();
    configs.insert(
        kind,
        ProviderConfig {
            api_key: Some("test-key".to_string()),
            base_url: Some(base_url.to_string()),
        },
    );
    ProviderRegistry::from_configs(&configs, Some(Duration::from_secs(5)))
}

async fn collect_deltas(
    registry: &ProviderRegistry,
    kind: ProviderKind,
    model_id: &str,
) -> Vec<Result<RawDelta, meetingmind_ai::AiError>> {
    let provider = registry.get(kind).expect("provider registered");
    let stream = provider
        .generate(
            GenerateRequest::new(model_id, "Meeting Topic: Sprint Review")
                .with_system_instruction("You are a meeting facilitator."),
        )
        .await
        .expect("generate should start");
    stream.collect().await
}

#[tokio::test]
async fn google_stream_normalizes_thinking_and_text() {
    let server = spawn_sse_server(&[
        r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"reading notes","thought":true}]}}]}"#,
        r####"{"candidates":[{"content":{"role":"model","parts":[{"text":"### Key Decisions\n"}]}}]}"####,
        r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"- Ship v2\n"}]},"finishReason":"STOP"}],"usageMetadata":{"promptTokenCount":12}}"#,
    ]);
    let registry = registry_for(ProviderKind::Google, &server.base_url);

    let deltas = collect_deltas(&registry, ProviderKind::Google, "gemini-2.5-flash-lite").await;
    assert_eq!(
        deltas,
        vec![
            Ok(RawDelta::thinking("reading notes")),
            Ok(RawDelta::text("### Key Decisions\n")),
            Ok(RawDelta::text("- Ship v2\n")),
        ]
    );

    let request = server.requests.recv().expect("captured request");
    assert!(request.contains(
        "POST /models/gemini-2.5-flash-lite:streamGenerateContent?alt=sse"
    ));
    assert!(request.to_ascii_lowercase().contains("x-goog-api-key: test-key"));
    assert!(request.contains("You are a meeting facilitator."));
}

#[tokio::test]
async fn openai_stream_reassembles_fragments_in_order() {
    let server = spawn_sse_server(&[
        r#"{"choices":[{"index":0,"delta":{"role":"assistant"}}]}"#,
        r#"{"choices":[{"index":0,"delta":{"content":"Hel"}}]}"#,
        r#"{"choices":[{"index":0,"delta":{"content":"lo, "}}]}"#,
        r#"{"choices":[{"index":0,"delta":{"content":"world"}}]}"#,
        r#"{"choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#,
        "[DONE]",
    ]);
    let registry = registry_for(ProviderKind::OpenAi, &server.base_url);

    let text = registry
        .get(ProviderKind::OpenAi)
        .expect("provider registered")
        .complete(GenerateRequest::new("gpt-4o-mini", "hi"))
        .await
        .expect("complete should succeed");
    assert_eq!(text, "Hello, world");

    let request = server.requests.recv().expect("captured request");
    assert!(request.contains("POST /chat/completions"));
    assert!(request.to_ascii_lowercase().contains("authorization: bearer test-key"));
    assert!(request.contains("\"stream\":true"));
}

#[tokio::test]
async fn malformed_chunks_are_skipped_without_ending_the_stream() {
    let server = spawn_sse_server(&[
        r#"{"choices":[{"index":0,"delta":{"content":"before"}}]}"#,
        "{not json",
        r#"{"unexpected":"shape"}"#,
        r#"{"choices":[{"index":0,"delta":{"content":" after"}}]}"#,
        "[DONE]",
    ]);
    let registry = registry_for(ProviderKind::OpenAi, &server.base_url);

    let deltas = collect_deltas(&registry, ProviderKind::OpenAi, "gpt-4o-mini").await;
    assert_eq!(
        deltas,
        vec![Ok(RawDelta::text("before")), Ok(RawDelta::text(" after"))]
    );
}

#[tokio::test]
async fn http_error_status_is_reported_with_provider_message() {
    let server = spawn_server(
        "HTTP/1.1 400 Bad Request",
        "application/json",
        r#"{"error":{"code":400,"message":"API key not valid","status":"INVALID_ARGUMENT"}}"#
            .to_string(),
    );
    let registry = registry_for(ProviderKind::Google, &server.base_url);

    let error = match registry
        .get(ProviderKind::Google)
        .expect("provider registered")
        .generate(GenerateRequest::new("gemini-2.5-flash-lite", "hi"))
        .await
    {
        Ok(_) => panic!("a 400 response should fail the call"),
        Err(error) => error,
    };
    assert_eq!(error.code, AiErrorCode::ProviderHttp);
    assert_eq!(error.message, "Google HTTP 400: API key not valid");
}

#[tokio::test]
async fn missing_credentials_never_reach_the_network() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind local test server");
    listener
        .set_nonblocking(true)
        .expect("nonblocking listener");
    let address = listener.local_addr().expect("server local addr");
    let hits = Arc::new(AtomicUsize::new(0));

    let mut configs = HashMap::new();
    configs.insert(
        ProviderKind::OpenAi,
        ProviderConfig {
            api_key: None,
            base_url: Some(format!("http://{address}")),
        },
    );
    let registry = ProviderRegistry::from_configs(&configs, None);
    assert!(!registry.is_configured(ProviderKind::OpenAi));

    let result = registry
        .get(ProviderKind::OpenAi)
        .expect("provider registered")
        .generate(GenerateRequest::new("gpt-4o-mini", "hi"))
        .await;
    let error = match result {
        Ok(_) => panic!("generate should fail without a key"),
        Err(error) => error,
    };
    assert_eq!(error.code, AiErrorCode::ProviderAuthMissing);

    while listener.accept().is_ok() {
        hits.fetch_add(1, Ordering::SeqCst);
    }
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}
