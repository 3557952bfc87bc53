//! OpenAI-compatible provider adapters for Relay
//!
//! A normalized [`ChatRequest`] flows through four stages: the provider
//! builds the upstream payload, a [`RateLimitedExecutor`] opens the call under
//! the shared limiter, a [`StreamTranslator`] turns raw chunks into
//! Anthropic-style [`NormalizedEvent`]s, and [`emit`] frames them as SSE.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod convert;
pub mod emit;
pub mod error;
pub mod executor;
pub mod protocol;
pub mod provider;
pub mod registry;
pub mod translate;
pub mod types;
pub mod upstream;

pub use error::{ErrorKind, LlmError};
pub use executor::RateLimitedExecutor;
pub use provider::{Provider, ProviderCapabilities};
pub use registry::ProviderRegistry;
pub use translate::{EventStream, StreamTranslator};
pub use types::{ChatRequest, NormalizedEvent, RawChunk};
pub use upstream::{ChunkStream, HttpUpstream, Upstream};
