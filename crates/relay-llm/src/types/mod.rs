//! Internal canonical types for requests and streamed events
//!
//! These types are provider-agnostic; wire formats convert to and from them.

pub mod message;
pub mod request;
pub mod stream;
pub mod tool;

pub use message::{Content, ContentPart, FunctionCall, Message, Role, ToolCall};
pub use request::{ChatRequest, CompletionParams, ThinkingConfig};
pub use stream::{BlockKind, NormalizedEvent, RawChunk, StopReason, Usage};
pub use tool::{FunctionDefinition, ToolDefinition};
