//! Live anomaly push channel.
//!
//! Consumes the server-sent-events endpoint (`/api/anomalies/stream`) that
//! emits named `anomaly` events carrying a JSON-encoded `AnomalyEvent`.
//! `AnomalyStream::connect` spawns a reader task and returns a handle plus
//! an mpsc receiver of `StreamEvent`s:
//!
//! ```text
//! AnomalyStream::connect()
//!        │
//!        ├─► Spawns reader task
//!        │   └─► Parses SSE frames, emits StreamEvents
//!        │
//!        └─► Returns (handle, mpsc::Receiver<StreamEvent>)
//! ```
//!
//! Malformed event payloads are dropped silently and never terminate the
//! connection. Connection errors emit a single `Disconnected` event and end
//! the task; the channel never reconnects on its own. The handle closes the
//! connection exactly once, and closing an already-closed channel is a
//! no-op.

use futures_util::StreamExt;
use pulse_core::events::StreamEvent;
use pulse_core::models::AnomalyEvent;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

/// Default capacity of the event channel handed to the consumer.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// SSE event name carrying anomaly payloads.
const ANOMALY_EVENT: &str = "anomaly";

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("failed to open push channel: {0}")]
    Connect(#[from] reqwest::Error),
    #[error("push endpoint rejected the request with status {0}")]
    BadStatus(reqwest::StatusCode),
}

#[derive(Debug, Clone)]
pub struct AnomalyStreamConfig {
    /// Full URL of the SSE endpoint.
    pub url: String,
    pub channel_capacity: usize,
}

impl AnomalyStreamConfig {
    #[must_use]
    pub fn new(url: String) -> Self {
        Self {
            url,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Owner of the push connection lifecycle.
///
/// Dropping the handle also closes the connection; `close` merely makes the
/// shutdown explicit.
pub struct AnomalyStreamHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl AnomalyStreamHandle {
    /// Closes the connection. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            // the reader may already be gone; that is fine
            let _ = tx.send(());
        }
    }
}

pub struct AnomalyStream;

impl AnomalyStream {
    /// Opens the push channel and spawns the reader task.
    ///
    /// # Errors
    /// Returns an error if the initial request fails or the endpoint does
    /// not answer with a success status. Failures after this point are
    /// reported as `StreamEvent::Disconnected`.
    pub async fn connect(
        config: AnomalyStreamConfig,
    ) -> Result<(AnomalyStreamHandle, mpsc::Receiver<StreamEvent>), StreamError> {
        debug!(url = %config.url, "opening anomaly push channel");
        let response = reqwest::Client::new()
            .get(&config.url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(StreamError::BadStatus(response.status()));
        }
        info!(url = %config.url, "anomaly push channel connected");

        let (event_tx, event_rx) = mpsc::channel(config.channel_capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(read_loop(response, event_tx, shutdown_rx));

        Ok((
            AnomalyStreamHandle {
                shutdown_tx: Some(shutdown_tx),
            },
            event_rx,
        ))
    }
}

async fn read_loop(
    response: reqwest::Response,
    event_tx: mpsc::Sender<StreamEvent>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let _ = event_tx.send(StreamEvent::Connected).await;

    let mut body = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();
    let mut parser = SseParser::default();

    let reason = loop {
        tokio::select! {
            // both an explicit close and a dropped handle end the task
            _ = &mut shutdown_rx => {
                debug!("push channel closed by handle");
                return;
            }
            chunk = body.next() => match chunk {
                Some(Ok(bytes)) => {
                    buffer.extend_from_slice(&bytes);
                    while let Some(line) = take_line(&mut buffer) {
                        if let Some(frame) = parser.push_line(&line) {
                            dispatch_frame(frame, &event_tx).await;
                        }
                    }
                }
                Some(Err(err)) => break format!("transport error: {err}"),
                None => break "stream ended by server".to_string(),
            }
        }
    };

    warn!(%reason, "anomaly push channel disconnected");
    let _ = event_tx.send(StreamEvent::Disconnected { reason }).await;
}

async fn dispatch_frame(frame: SseFrame, event_tx: &mpsc::Sender<StreamEvent>) {
    if frame.event != ANOMALY_EVENT {
        trace!(event = %frame.event, "ignoring unnamed or unrelated SSE event");
        return;
    }
    match serde_json::from_str::<AnomalyEvent>(&frame.data) {
        Ok(event) => {
            let _ = event_tx.send(StreamEvent::Anomaly(event)).await;
        }
        Err(err) => {
            // malformed payloads are non-fatal
            debug!(%err, "dropping malformed anomaly message");
        }
    }
}

/// Pops one `\n`-terminated line off the buffer, trimming a trailing `\r`.
fn take_line(buffer: &mut Vec<u8>) -> Option<String> {
    let pos = buffer.iter().position(|&b| b == b'\n')?;
    let mut line: Vec<u8> = buffer.drain(..=pos).collect();
    line.pop();
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Some(String::from_utf8_lossy(&line).into_owned())
}

/// A complete server-sent event.
#[derive(Debug, PartialEq, Eq)]
struct SseFrame {
    event: String,
    data: String,
}

/// Minimal SSE field accumulator: `event:`/`data:` fields, multi-line data,
/// `:` comments, blank-line dispatch.
#[derive(Debug, Default)]
struct SseParser {
    event: Option<String>,
    data: Vec<String>,
}

impl SseParser {
    fn push_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            if self.data.is_empty() && self.event.is_none() {
                return None;
            }
            let frame = SseFrame {
                event: self.event.take().unwrap_or_else(|| "message".to_string()),
                data: std::mem::take(&mut self.data).join("\n"),
            };
            return Some(frame);
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            // id/retry are irrelevant to this consumer
            _ => {}
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(parser: &mut SseParser, lines: &[&str]) -> Vec<SseFrame> {
        lines
            .iter()
            .filter_map(|line| parser.push_line(line))
            .collect()
    }

    #[test]
    fn parses_named_event_frame() {
        let mut parser = SseParser::default();
        let frames = feed(
            &mut parser,
            &["event: anomaly", r#"data: {"id":"x1"}"#, ""],
        );
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, "anomaly");
        assert_eq!(frames[0].data, r#"{"id":"x1"}"#);
    }

    #[test]
    fn joins_multi_line_data() {
        let mut parser = SseParser::default();
        let frames = feed(&mut parser, &["data: hello", "data: world", ""]);
        assert_eq!(frames[0].event, "message");
        assert_eq!(frames[0].data, "hello\nworld");
    }

    #[test]
    fn skips_comments_and_stray_blank_lines() {
        let mut parser = SseParser::default();
        let frames = feed(
            &mut parser,
            &[": keep-alive", "", "", "event: anomaly", "data: {}", ""],
        );
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn consecutive_frames_do_not_leak_state() {
        let mut parser = SseParser::default();
        let frames = feed(
            &mut parser,
            &["event: anomaly", "data: a", "", "data: b", ""],
        );
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].event, "message");
        assert_eq!(frames[1].data, "b");
    }

    #[test]
    fn take_line_handles_crlf_and_partial_chunks() {
        let mut buffer = b"data: one\r\ndata: tw".to_vec();
        assert_eq!(take_line(&mut buffer).as_deref(), Some("data: one"));
        assert_eq!(take_line(&mut buffer), None);
        buffer.extend_from_slice(b"o\n");
        assert_eq!(take_line(&mut buffer).as_deref(), Some("data: two"));
    }

    #[test]
    fn closing_twice_is_a_noop() {
        let (tx, _rx) = oneshot::channel();
        let mut handle = AnomalyStreamHandle {
            shutdown_tx: Some(tx),
        };
        handle.close();
        handle.close();
    }
}
