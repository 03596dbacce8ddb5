use serde::{Deserialize, Serialize};

use super::response::{FinishReason, Usage};

/// Incremental unit of a streaming response
///
/// Delivered to the caller's callback in arrival order. Exactly one
/// [`StreamChunk::Done`] ends every stream, synthesized if the vendor closed
/// the connection without a terminal marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamChunk {
    /// Text delta
    Content {
        /// Text to append
        text: String,
    },
    /// Partial tool call
    ToolCall(ToolCallDelta),
    /// Finish reason and/or usage, usually just before `Done`
    Finish {
        /// Why generation stopped
        #[serde(default, skip_serializing_if = "Option::is_none")]
        finish_reason: Option<FinishReason>,
        /// Token usage reported so far
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },
    /// Terminal marker
    Done,
}

impl StreamChunk {
    /// Text delta chunk
    pub fn content(text: impl Into<String>) -> Self {
        Self::Content { text: text.into() }
    }

    /// Whether this is the terminal marker
    pub const fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

/// Fragment of a tool call within a stream
///
/// The id and name usually arrive on the first fragment only; later
/// fragments carry argument text keyed by `index`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    /// Position of the call within the response
    pub index: u32,
    /// Call identifier, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Function name, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Raw argument JSON fragment
    #[serde(default)]
    pub arguments: String,
}
