use std::convert::Infallible;
use std::str::FromStr;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{Span, info};

use crate::events::{EventStream, InternalEvent, WireEventType, WirePayload};

pub const TRAILER_SEPARATOR: &str = "---";

/// Payload encoding placed after `data: ` in each frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WireEncoding {
    /// Compact JSON object with a `type` tag.
    #[default]
    Json,
    /// Raw text lines, one frame per line.
    Lines,
}

impl FromStr for WireEncoding {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(WireEncoding::Json),
            "lines" | "text" => Ok(WireEncoding::Lines),
            other => Err(format!(
                "unsupported wire_encoding '{other}' (expected 'json' or 'lines')"
            )),
        }
    }
}

/// The open output channel of one request.
///
/// Owned by the response body; dropping the body, whether it finished or the
/// client went away, releases the session.
pub struct StreamSession {
    span: Span,
    started_at: Instant,
    frames: usize,
    completed: bool,
}

impl StreamSession {
    pub fn open(started_at: Instant) -> Self {
        Self {
            span: Span::current(),
            started_at,
            frames: 0,
            completed: false,
        }
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        let _entered = self.span.enter();
        let elapsed_ms = self.started_at.elapsed().as_millis() as u64;
        if self.completed {
            info!(frames = self.frames, elapsed_ms, "stream session closed");
        } else {
            info!(
                frames = self.frames,
                elapsed_ms, "stream session dropped before the trailer was sent"
            );
        }
    }
}

/// Serializes `events` into SSE frames, then appends the fixed trailer.
///
/// The trailer (blank line, separator, elapsed time and model name) follows
/// every stream, including one that ended with an `Error` event.
pub fn frame_events(
    mut events: EventStream,
    started_at: Instant,
    model_display_name: String,
    encoding: WireEncoding,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send {
    let mut session = StreamSession::open(started_at);
    async_stream::stream! {
        while let Some(event) = events.next().await {
            for frame in encode_event(&event, encoding) {
                session.frames += 1;
                yield Ok(frame);
            }
        }

        let metadata = metadata_line(started_at.elapsed().as_secs_f64(), &model_display_name);
        for line in ["", TRAILER_SEPARATOR, metadata.as_str()] {
            session.frames += 1;
            yield Ok(encode_trailer_line(line, encoding));
        }
        session.completed = true;
    }
}

pub fn metadata_line(elapsed_secs: f64, model_display_name: &str) -> String {
    format!("⏱ Generated in {elapsed_secs:.2}s · Model: {model_display_name}")
}

pub fn encode_event(event: &InternalEvent, encoding: WireEncoding) -> Vec<Bytes> {
    match encoding {
        WireEncoding::Json => vec![json_frame(&event.to_wire())],
        WireEncoding::Lines => match event {
            InternalEvent::Text(text) | InternalEvent::AgentText { text, .. } => line_frames(text),
            InternalEvent::Thinking(_) | InternalEvent::AgentThinking { .. } => Vec::new(),
            InternalEvent::Status(message) => line_frames(message),
            InternalEvent::AgentStart { agent, role } => line_frames(&format!("[{agent}] {role}")),
            InternalEvent::AgentDone { agent } => line_frames(&format!("[{agent}] done")),
            InternalEvent::Error(message) => line_frames(&format!("Error: {message}")),
        },
    }
}

fn encode_trailer_line(line: &str, encoding: WireEncoding) -> Bytes {
    match encoding {
        WireEncoding::Json => json_frame(&WirePayload {
            event_type: WireEventType::Text,
            content: line,
            agent: None,
            role: None,
        }),
        WireEncoding::Lines => data_frame(line),
    }
}

fn json_frame(payload: &WirePayload<'_>) -> Bytes {
    let json = serde_json::to_string(payload).unwrap_or_else(|_| {
        r#"{"type":"error","content":"failed to encode event"}"#.to_string()
    });
    data_frame(&json)
}

fn data_frame(payload: &str) -> Bytes {
    Bytes::from(format!("data: {payload}\n\n"))
}

/// Legacy framing: one frame per line, with a `data:  ` continuation frame
/// between lines so the client can restore the line breaks.
fn line_frames(text: &str) -> Vec<Bytes> {
    let lines: Vec<&str> = text.split('\n').collect();
    let mut frames = Vec::with_capacity(lines.len() * 2);
    if let Some((last, head)) = lines.split_last() {
        for line in head {
            frames.push(data_frame(line));
            frames.push(Bytes::from_static(b"data:  \n"));
        }
        frames.push(data_frame(last));
    }
    frames
}
