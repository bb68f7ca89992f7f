//! Streaming chat client for `/api/llm/*`.
//!
//! `stream_chat` hands back a cancellable `Stream` of [`ChatStreamEvent`];
//! `stream_chat_message` drives that stream into three callbacks for callers
//! that only want to render a running transcript.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::future::{BoxFuture, FutureExt};
use futures_util::stream::{Stream, StreamExt};
use tracing::field;
use tracing_futures::Instrument;

use crate::cancel::CancelToken;
use crate::error::{CoreResult, ForgeError};
use crate::http_client::HttpClient;
use crate::model::{ChatRequest, GenerateAppRequest, GeneratedApp, ProviderList};
use crate::normalizer::normalize_message;
use crate::sse::ChatEventStream;
use crate::stream::{BoxEventStream, ChatStreamEvent};
use crate::telemetry::{KEY_CHUNKS, KEY_ERROR_MESSAGE, KEY_OUTCOME};

pub const DEFAULT_PROVIDER: &str = "gpt4";

#[derive(Debug, Clone)]
pub struct ChatClient {
    http: HttpClient,
    base: String,
}

/// Event stream of one chat request. Dropping it closes the connection;
/// cancelling its token does the same from another task.
pub struct ChatStream {
    inner: Option<BoxEventStream>,
    cancel: CancelToken,
    cancelled: BoxFuture<'static, ()>,
}

impl ChatStream {
    pub fn new(inner: BoxEventStream, cancel: CancelToken) -> Self {
        Self {
            inner: Some(inner),
            cancelled: cancel.clone().cancelled_owned(),
            cancel,
        }
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Stream for ChatStream {
    type Item = ChatStreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.cancelled.poll_unpin(cx).is_ready() {
            self.inner = None;
            return Poll::Ready(None);
        }
        let Some(inner) = self.inner.as_mut() else {
            return Poll::Ready(None);
        };
        match inner.poll_next_unpin(cx) {
            Poll::Ready(None) => {
                self.inner = None;
                Poll::Ready(None)
            }
            other => other,
        }
    }
}

/// Terminal state of a callback-driven stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminal {
    /// No terminal event yet (or the call was cancelled before one arrived).
    Open,
    Done,
    Failed(String),
}

/// Per-call state of [`ChatClient::stream_chat_message`]. Owned by that call only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSession {
    provider: String,
    text: String,
    chunks: usize,
    terminal: Terminal,
}

impl StreamSession {
    fn new(provider: &str) -> Self {
        Self {
            provider: provider.to_string(),
            text: String::new(),
            chunks: 0,
            terminal: Terminal::Open,
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Everything received so far, in arrival order. Never shrinks.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn chunks(&self) -> usize {
        self.chunks
    }

    pub fn terminal(&self) -> &Terminal {
        &self.terminal
    }

    fn append(&mut self, delta: &str) {
        self.text.push_str(delta);
        self.chunks += 1;
    }
}

impl ChatClient {
    pub fn new(http: HttpClient, base: impl Into<String>) -> Self {
        let base = base.into().trim_end_matches('/').to_string();
        Self { http, base }
    }

    #[cfg(test)]
    pub fn new_for_tests(server_base: &str) -> Self {
        Self::new(HttpClient::new_default().unwrap(), server_base)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/llm/{path}", self.base)
    }

    pub async fn stream_chat(&self, message: &str, provider: &str) -> CoreResult<ChatStream> {
        self.stream_chat_with(message, provider, CancelToken::new())
            .await
    }

    /// Open one streaming request. Provider ids are passed through unchecked;
    /// an unknown one surfaces as whatever the backend answers.
    pub async fn stream_chat_with(
        &self,
        message: &str,
        provider: &str,
        cancel: CancelToken,
    ) -> CoreResult<ChatStream> {
        let body = ChatRequest {
            message: normalize_message(message)?,
            provider: provider.to_string(),
        };
        let url = self.url("chat");
        let open = self.http.post_event_stream(&url, &body);
        let bytes = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ForgeError::Cancelled),
            r = open => r?,
        };
        let events: BoxEventStream = Box::pin(ChatEventStream::new(bytes));
        Ok(ChatStream::new(events, cancel))
    }

    pub async fn stream_chat_message<C, D, E>(
        &self,
        message: &str,
        provider: &str,
        on_chunk: C,
        on_complete: D,
        on_error: E,
    ) -> StreamSession
    where
        C: FnMut(&str),
        D: FnOnce(),
        E: FnOnce(&str),
    {
        self.stream_chat_message_with(
            message,
            provider,
            CancelToken::new(),
            on_chunk,
            on_complete,
            on_error,
        )
        .await
    }

    /// Callback form. `on_chunk` fires per content delta in order; then exactly
    /// one of `on_complete` / `on_error` fires once. If `cancel` fires first,
    /// neither does and the returned session stays `Terminal::Open`.
    pub async fn stream_chat_message_with<C, D, E>(
        &self,
        message: &str,
        provider: &str,
        cancel: CancelToken,
        mut on_chunk: C,
        on_complete: D,
        on_error: E,
    ) -> StreamSession
    where
        C: FnMut(&str),
        D: FnOnce(),
        E: FnOnce(&str),
    {
        let span = tracing::info_span!(
            "chat.stream",
            "llm.provider" = %provider,
            "stream.chunks" = field::Empty,
            "outcome" = field::Empty,
            "error.message" = field::Empty,
        );
        let mut session = StreamSession::new(provider);

        let opened = self
            .stream_chat_with(message, provider, cancel)
            .instrument(span.clone())
            .await;
        let mut stream = match opened {
            Ok(s) => s,
            Err(ForgeError::Cancelled) => {
                span.record(KEY_OUTCOME, "cancelled");
                return session;
            }
            Err(e) => {
                let msg = e.to_string();
                span.record(KEY_OUTCOME, "error");
                span.record(KEY_ERROR_MESSAGE, msg.as_str());
                session.terminal = Terminal::Failed(msg.clone());
                on_error(&msg);
                return session;
            }
        };

        while let Some(ev) = stream.next().await {
            match ev {
                ChatStreamEvent::Content { text } => {
                    session.append(&text);
                    on_chunk(&text);
                }
                ChatStreamEvent::Done => {
                    span.record(KEY_CHUNKS, session.chunks as u64);
                    span.record(KEY_OUTCOME, "done");
                    session.terminal = Terminal::Done;
                    on_complete();
                    return session;
                }
                ChatStreamEvent::Error { message } => {
                    span.record(KEY_CHUNKS, session.chunks as u64);
                    span.record(KEY_OUTCOME, "error");
                    span.record(KEY_ERROR_MESSAGE, message.as_str());
                    session.terminal = Terminal::Failed(message.clone());
                    on_error(&message);
                    return session;
                }
            }
        }

        // Only reachable through cancellation: the event stream always ends
        // with a terminal event otherwise.
        span.record(KEY_CHUNKS, session.chunks as u64);
        span.record(KEY_OUTCOME, "cancelled");
        session
    }

    /// Non-streaming variant of the chat endpoint; returns the raw JSON reply.
    pub async fn send_chat_message(
        &self,
        message: &str,
        provider: &str,
    ) -> CoreResult<serde_json::Value> {
        let body = ChatRequest {
            message: normalize_message(message)?,
            provider: provider.to_string(),
        };
        self.http.post_json(&self.url("chat"), &body).await
    }

    pub async fn providers(&self) -> CoreResult<ProviderList> {
        self.http.get_json(&self.url("providers")).await
    }

    pub async fn generate_app(
        &self,
        description: &str,
        framework: &str,
        provider: &str,
    ) -> CoreResult<GeneratedApp> {
        let body = GenerateAppRequest {
            description: normalize_message(description)?,
            framework: framework.to_string(),
            provider: provider.to_string(),
        };
        self.http.post_json(&self.url("generate-app"), &body).await
    }
}
