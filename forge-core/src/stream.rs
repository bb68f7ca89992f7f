//! Streaming primitives exposed by forge-core.
//!
//! Contract:
//! - A chat stream yields 0..n `Content` events followed by exactly one terminal
//!   event: `Done` or `Error`.
//! - After a terminal event, no further events are emitted.
//! - A cancelled stream simply ends; it yields no terminal event.

use serde::{Deserialize, Serialize};

/// One decoded unit of the chat event stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ChatStreamEvent {
    /// Partial assistant text, in arrival order.
    Content { text: String },
    /// Server signalled the end of the reply.
    Done,
    /// Server-reported or transport failure; stream ends after this.
    Error { message: String },
}

impl ChatStreamEvent {
    pub fn content(text: impl Into<String>) -> Self {
        Self::Content { text: text.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Returns true if this event terminates the stream (`Done` or `Error`).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error { .. })
    }
}

/// Boxed stream of chat events.
pub type BoxEventStream = futures::stream::BoxStream<'static, ChatStreamEvent>;
