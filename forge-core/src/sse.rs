//! Decoder for the chat event stream.
//!
//! The server sends newline-delimited records; the ones that matter look like
//! `data: {"content": "..."}`, `data: {"done": true}` or `data: {"error": "..."}`.
//! Anything else (comments, blank keep-alive lines, `{"status": "started"}`,
//! malformed JSON) is dropped without an event.

use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::stream::Stream;
use serde_json::Value;

use crate::stream::ChatStreamEvent;

const DATA_PREFIX: &str = "data: ";

/// Largest partial record kept between reads. Longer records are discarded
/// up to their terminating newline.
pub const MAX_RECORD_BYTES: usize = 1 << 20;

/// Where the decoder is in its life cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// Waiting for (more of) a record.
    AccumulatingLine,
    /// Last complete record produced a non-terminal event.
    EmittedEvent,
    /// A terminal event was produced; further input is ignored.
    StreamEnded,
}

/// Push-based decoder. Holds the byte remainder of a partial record across reads,
/// so records (and multi-byte UTF-8 sequences) may be split at any offset.
#[derive(Debug)]
pub struct SseDecoder {
    pending: Vec<u8>,
    state: DecoderState,
    // Inside an oversized record whose head was already thrown away.
    discarding: bool,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            state: DecoderState::AccumulatingLine,
            discarding: false,
        }
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    pub fn is_ended(&self) -> bool {
        self.state == DecoderState::StreamEnded
    }

    /// Feed one transport read; returns the events completed by it, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<ChatStreamEvent> {
        let mut out = Vec::new();
        if self.is_ended() {
            return out;
        }
        // Bytes already buffered hold no newline; only the new read is scanned.
        let mut scan = self.pending.len();
        self.pending.extend_from_slice(chunk);

        let mut start = 0;
        while let Some(off) = self.pending[scan..].iter().position(|b| *b == b'\n') {
            let end = scan + off;
            let range = start..end;
            start = end + 1;
            scan = start;
            if std::mem::take(&mut self.discarding) {
                continue;
            }
            let record = String::from_utf8_lossy(&self.pending[range]).into_owned();
            if self.accept(&record, &mut out) {
                self.pending.clear();
                return out;
            }
        }
        self.pending.drain(..start);
        if self.pending.len() > MAX_RECORD_BYTES {
            tracing::warn!(
                bytes = self.pending.len(),
                "dropping oversized stream record"
            );
            self.pending.clear();
            self.discarding = true;
        }
        if out.is_empty() {
            self.state = DecoderState::AccumulatingLine;
        }
        out
    }

    /// Flush an unterminated final record once the transport has ended.
    pub fn finish(&mut self) -> Vec<ChatStreamEvent> {
        let mut out = Vec::new();
        if self.is_ended() || self.discarding || self.pending.is_empty() {
            self.pending.clear();
            return out;
        }
        let tail = std::mem::take(&mut self.pending);
        let record = String::from_utf8_lossy(&tail).into_owned();
        self.accept(&record, &mut out);
        out
    }

    // Returns true once a terminal event has been emitted.
    fn accept(&mut self, record: &str, out: &mut Vec<ChatStreamEvent>) -> bool {
        let Some(ev) = decode_line(record) else {
            return false;
        };
        let terminal = ev.is_terminal();
        out.push(ev);
        self.state = if terminal {
            DecoderState::StreamEnded
        } else {
            DecoderState::EmittedEvent
        };
        terminal
    }
}

/// Decode one record (without its newline). Returns `None` for anything that
/// is not a recognised `data: ` payload.
pub fn decode_line(line: &str) -> Option<ChatStreamEvent> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let payload = line.strip_prefix(DATA_PREFIX)?;
    let value: Value = serde_json::from_str(payload).ok()?;
    let obj = value.as_object()?;

    if let Some(err) = obj.get("error").filter(|v| is_truthy(v)) {
        let message = match err {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        return Some(ChatStreamEvent::Error { message });
    }
    if obj.get("done").is_some_and(is_truthy) {
        return Some(ChatStreamEvent::Done);
    }
    match obj.get("content") {
        Some(Value::String(s)) if !s.is_empty() => Some(ChatStreamEvent::content(s.clone())),
        _ => None,
    }
}

fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Raw body stream as delivered by the transport.
pub type ByteStream<E> = Pin<Box<dyn Stream<Item = Result<Bytes, E>> + Send>>;

/// Adapts a body byte stream into an ordered stream of `ChatStreamEvent`s.
///
/// A transport error becomes a single `Error` event; so does an end of body
/// that arrives before any terminal record. Nothing is yielded afterwards.
pub struct ChatEventStream<E> {
    inner: Option<ByteStream<E>>,
    decoder: SseDecoder,
    ready: VecDeque<ChatStreamEvent>,
    finished: bool,
}

impl<E> ChatEventStream<E> {
    pub fn new(inner: ByteStream<E>) -> Self {
        Self {
            inner: Some(inner),
            decoder: SseDecoder::new(),
            ready: VecDeque::new(),
            finished: false,
        }
    }

    fn enqueue(&mut self, events: Vec<ChatStreamEvent>) {
        for ev in events {
            let terminal = ev.is_terminal();
            self.ready.push_back(ev);
            if terminal {
                self.end();
                break;
            }
        }
    }

    fn end(&mut self) {
        self.finished = true;
        // Drop the body so the connection is released as soon as we know the outcome.
        self.inner = None;
    }
}

impl<E: Display> Stream for ChatEventStream<E> {
    type Item = ChatStreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(ev) = self.ready.pop_front() {
                return Poll::Ready(Some(ev));
            }
            if self.finished {
                return Poll::Ready(None);
            }
            let Some(inner) = self.inner.as_mut() else {
                self.finished = true;
                return Poll::Ready(None);
            };

            match inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    let events = self.decoder.push(&chunk);
                    self.enqueue(events);
                }
                Poll::Ready(Some(Err(e))) => {
                    tracing::debug!(error = %e, "chat stream transport error");
                    self.ready
                        .push_back(ChatStreamEvent::error(format!("network error: {e}")));
                    self.end();
                }
                Poll::Ready(None) => {
                    let events = self.decoder.finish();
                    self.enqueue(events);
                    if !self.finished {
                        self.ready.push_back(ChatStreamEvent::error(
                            "protocol error: stream closed before completion",
                        ));
                        self.end();
                    }
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
