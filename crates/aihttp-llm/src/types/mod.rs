//! Provider-agnostic request, response and stream types
//!
//! Every wire format converts to and from these; callers never see a
//! vendor payload except through [`CompletionResponse::raw`].

pub mod message;
pub mod request;
pub mod response;
pub mod stream;
pub mod tool;

pub use message::{Content, ContentPart, FileRef, FileSource, Message, Role};
pub use request::{CompletionParams, CompletionRequest};
pub use response::{CompletionResponse, FinishReason, Usage};
pub use stream::{StreamChunk, ToolCallDelta};
pub use tool::{ToolCall, ToolChoice, ToolDefinition};
