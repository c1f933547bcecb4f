//! Stream reader task.
//!
//! Reads newline-delimited JSON from the collaborator's stdout, decodes
//! each line into one or more [`StreamEvent`]s, classifies them, and
//! forwards the results through a bounded tokio [`mpsc`] channel. Every
//! raw line is also copied to the session's output file.
//!
//! # Recognized shapes
//!
//! | `type`      | Maps to                                             |
//! |-------------|-----------------------------------------------------|
//! | `tool_call` | [`StreamEvent::ToolCall`] (`tool` is required)      |
//! | `error`     | [`StreamEvent::Error`]                              |
//! | `assistant` | one [`StreamEvent::ToolCall`] per `tool_use` block  |
//! | `result`    | [`StreamEvent::Error`] when `is_error` is `true`    |
//! | *(other)*   | [`StreamEvent::Other`], verbatim                    |

use futures_util::StreamExt;
use serde_json::{Map, Value};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::models::event::{ClassifiedEvent, StreamEvent};
use crate::stream::codec::{Frame, StreamCodec};
use crate::{AppError, Result};

/// Fields that may carry a `tool_call` payload, in lookup order.
const PAYLOAD_KEYS: &[&str] = &["input", "arguments", "args", "params"];

/// Message sent from the reader to the reconstructor.
#[derive(Debug, Clone, PartialEq)]
pub enum ReaderMessage {
    /// A decoded, classified event.
    Event {
        /// 1-based source line.
        line: u64,
        /// Classified event.
        event: ClassifiedEvent,
    },
    /// A line that could not be decoded; it was skipped.
    Malformed {
        /// 1-based source line.
        line: u64,
        /// Decoder error text.
        error: String,
    },
}

/// Counters reported when the reader stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStats {
    /// Lines framed, including blank and malformed ones.
    pub lines: u64,
    /// Events forwarded.
    pub events: u64,
    /// Lines skipped as malformed.
    pub malformed: u64,
}

/// Decode one line of collaborator output.
///
/// # Return value
///
/// - `Ok(vec![])` — blank line.
/// - `Ok(events)` — one event, or one per `tool_use` block of an
///   `assistant` message.
///
/// # Errors
///
/// - [`AppError::Parse`]`("malformed json: …")` — not valid JSON.
/// - [`AppError::Parse`]`("expected a json object …")` — valid JSON that
///   is not an object.
/// - [`AppError::Parse`]`("tool_call missing …")` — a `tool_call` without
///   a string `tool` field.
pub fn parse_stream_line(line: &str) -> Result<Vec<StreamEvent>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Vec::new());
    }

    let value: Value =
        serde_json::from_str(line).map_err(|e| AppError::Parse(format!("malformed json: {e}")))?;

    let kind = json_kind(&value);
    let Value::Object(object) = value else {
        return Err(AppError::Parse(format!(
            "expected a json object, got {kind}"
        )));
    };

    let event_type = object
        .get("type")
        .and_then(Value::as_str)
        .map(str::to_owned);
    let is_error = object.get("is_error").and_then(Value::as_bool) == Some(true);

    match event_type.as_deref() {
        Some("tool_call") => parse_tool_call(object).map(|event| vec![event]),
        Some("error") => Ok(vec![StreamEvent::Error {
            message: error_message(&object),
        }]),
        Some("assistant") => Ok(parse_assistant(object)),
        Some("result") if is_error => {
            Ok(vec![StreamEvent::Error {
                message: result_error_message(&object),
            }])
        }
        _ => Ok(vec![StreamEvent::Other(Value::Object(object))]),
    }
}

/// Reader task — frames `stdout`, decodes each line, and forwards
/// [`ReaderMessage`]s through `event_tx` in arrival order.
///
/// Raw lines are appended to `capture`. A failing capture sink is logged
/// once and then ignored; it never stops the reader.
///
/// The task returns on EOF, on cancellation, or when `event_tx` is closed.
/// Dropping `event_tx` on return is what tells the consumer the stream has
/// ended.
///
/// # Errors
///
/// Returns [`AppError::Io`] if reading from `stdout` fails. Messages
/// already forwarded stay valid.
pub async fn run_reader<R, W>(
    session_id: String,
    stdout: R,
    mut capture: W,
    event_tx: mpsc::Sender<ReaderMessage>,
    cancel: CancellationToken,
) -> Result<ReaderStats>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let mut framed = FramedRead::new(stdout, StreamCodec::new());
    let mut stats = ReaderStats::default();
    let mut capture_ok = true;

    let outcome = loop {
        let item = tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(session_id, "stream reader: cancellation received, stopping");
                break Ok(());
            }

            item = framed.next() => item,
        };

        let frame = match item {
            None => {
                debug!(session_id, lines = stats.lines, "stream reader: EOF detected");
                break Ok(());
            }
            Some(Err(err)) => {
                warn!(session_id, error = %err, "stream reader: IO error, stopping");
                break Err(err);
            }
            Some(Ok(frame)) => frame,
        };

        stats.lines += 1;
        let line_no = stats.lines;

        // Every frame occupies one capture line, so reported line numbers
        // stay aligned with the capture file.
        if capture_ok {
            let raw = match &frame {
                Frame::Line(line) => line.as_bytes(),
                Frame::Malformed { raw, .. } => &raw[..],
            };
            if let Err(err) = write_line(&mut capture, raw).await {
                warn!(session_id, %err, "stream reader: capture failed, continuing without it");
                capture_ok = false;
            }
        }

        let messages = match frame {
            Frame::Line(line) => decode_line(&session_id, line_no, &line),
            Frame::Malformed { error, .. } => {
                warn!(session_id, line = line_no, %error, "stream reader: malformed line");
                vec![ReaderMessage::Malformed {
                    line: line_no,
                    error,
                }]
            }
        };

        let mut closed = false;
        for message in messages {
            match &message {
                ReaderMessage::Event { .. } => stats.events += 1,
                ReaderMessage::Malformed { .. } => stats.malformed += 1,
            }
            if event_tx.send(message).await.is_err() {
                closed = true;
                break;
            }
        }
        if closed {
            debug!(session_id, "stream reader: event_tx closed, stopping");
            break Ok(());
        }
    };

    if capture_ok {
        if let Err(err) = capture.flush().await {
            warn!(session_id, %err, "stream reader: failed to flush capture");
        }
    }

    outcome.map(|()| stats)
}

// ── Private helpers ───────────────────────────────────────────────────────────

fn decode_line(session_id: &str, line_no: u64, line: &str) -> Vec<ReaderMessage> {
    match parse_stream_line(line) {
        Ok(events) => events
            .into_iter()
            .map(|event| ReaderMessage::Event {
                line: line_no,
                event: ClassifiedEvent::classify(event),
            })
            .collect(),
        Err(err) => {
            warn!(
                session_id,
                line = line_no,
                error = %err,
                raw_line = %line,
                "stream reader: parse error, skipping line"
            );
            vec![ReaderMessage::Malformed {
                line: line_no,
                error: err.to_string(),
            }]
        }
    }
}

async fn write_line<W>(capture: &mut W, line: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    capture.write_all(line).await?;
    capture.write_all(b"\n").await
}

fn parse_tool_call(mut object: Map<String, Value>) -> Result<StreamEvent> {
    let tool = match object.remove("tool") {
        Some(Value::String(tool)) if !tool.is_empty() => tool,
        _ => {
            return Err(AppError::Parse(
                "tool_call missing required string field `tool`".into(),
            ))
        }
    };
    object.remove("type");

    let payload = PAYLOAD_KEYS
        .iter()
        .find_map(|key| object.remove(*key))
        .unwrap_or(Value::Object(object));

    Ok(StreamEvent::ToolCall { tool, payload })
}

fn parse_assistant(object: Map<String, Value>) -> Vec<StreamEvent> {
    let calls: Vec<StreamEvent> = object
        .get("message")
        .and_then(|message| message.get("content"))
        .and_then(Value::as_array)
        .map(|blocks| {
            blocks
                .iter()
                .filter(|block| block.get("type").and_then(Value::as_str) == Some("tool_use"))
                .filter_map(|block| {
                    let tool = block.get("name").and_then(Value::as_str)?;
                    Some(StreamEvent::ToolCall {
                        tool: tool.to_owned(),
                        payload: block.get("input").cloned().unwrap_or(Value::Null),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    if calls.is_empty() {
        vec![StreamEvent::Other(Value::Object(object))]
    } else {
        calls
    }
}

fn error_message(object: &Map<String, Value>) -> String {
    if let Some(message) = object.get("message").and_then(Value::as_str) {
        return message.to_owned();
    }
    match object.get("error") {
        Some(Value::String(message)) => message.clone(),
        Some(nested) => nested
            .get("message")
            .and_then(Value::as_str)
            .map_or_else(|| nested.to_string(), str::to_owned),
        None => Value::Object(object.clone()).to_string(),
    }
}

fn result_error_message(object: &Map<String, Value>) -> String {
    object
        .get("result")
        .and_then(Value::as_str)
        .or_else(|| object.get("subtype").and_then(Value::as_str))
        .unwrap_or("collaborator reported an error result")
        .to_owned()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
