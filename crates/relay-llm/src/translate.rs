//! Stream translation from raw upstream chunks to normalized events
//!
//! A [`StreamTranslator`] tracks which content block is open and emits the
//! `message_start` .. `message_stop` envelope around the blocks. It moves
//! through `NotStarted -> Started -> {TextActive | ThinkingActive} -> Stopped`
//! and never reopens a block index.

use std::pin::Pin;

use futures_util::{Stream, StreamExt, stream};

use crate::error::LlmError;
use crate::types::{BlockKind, NormalizedEvent, RawChunk, StopReason, Usage};
use crate::upstream::ChunkStream;

/// Normalized events of one response, ending at `message_stop` or an error
pub type EventStream = Pin<Box<dyn Stream<Item = Result<NormalizedEvent, LlmError>> + Send>>;

/// Position of the translator within the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TranslatorState {
    /// No chunk seen yet
    NotStarted,
    /// `message_start` emitted, no block open
    Started,
    /// A text block is open
    TextActive {
        /// Index of the open block
        index: u32,
    },
    /// A thinking block is open
    ThinkingActive {
        /// Index of the open block
        index: u32,
    },
    /// `message_stop` emitted
    Stopped,
}

impl TranslatorState {
    const fn open_block(self) -> Option<(u32, BlockKind)> {
        match self {
            Self::TextActive { index } => Some((index, BlockKind::Text)),
            Self::ThinkingActive { index } => Some((index, BlockKind::Thinking)),
            Self::NotStarted | Self::Started | Self::Stopped => None,
        }
    }

    const fn active(kind: BlockKind, index: u32) -> Self {
        match kind {
            BlockKind::Text => Self::TextActive { index },
            BlockKind::Thinking => Self::ThinkingActive { index },
        }
    }
}

/// Per-stream bookkeeping
#[derive(Debug)]
struct StreamContext {
    message_id: String,
    model: String,
    next_index: u32,
    usage: Option<Usage>,
    stop_reason: Option<StopReason>,
    reasoning: bool,
}

/// Incremental translator for one response
#[derive(Debug)]
pub struct StreamTranslator {
    state: TranslatorState,
    context: StreamContext,
}

impl StreamTranslator {
    /// Translator for a response to `model`
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            state: TranslatorState::NotStarted,
            context: StreamContext {
                message_id: format!("msg_{}", uuid::Uuid::new_v4().simple()),
                model: model.into(),
                next_index: 0,
                usage: None,
                stop_reason: None,
                reasoning: true,
            },
        }
    }

    /// Whether reasoning deltas become thinking blocks or are dropped
    #[must_use]
    pub const fn with_reasoning(mut self, reasoning: bool) -> Self {
        self.context.reasoning = reasoning;
        self
    }

    /// Message identifier carried by `message_start`
    pub fn message_id(&self) -> &str {
        &self.context.message_id
    }

    /// Whether `message_stop` has been emitted
    pub const fn is_stopped(&self) -> bool {
        matches!(self.state, TranslatorState::Stopped)
    }

    /// Translate one chunk
    ///
    /// Chunks arriving after the stop are ignored.
    pub fn process(&mut self, chunk: &RawChunk) -> Vec<NormalizedEvent> {
        let mut events = Vec::new();

        if self.is_stopped() {
            tracing::debug!("ignoring chunk after message stop");
            return events;
        }

        self.ensure_started(&mut events);

        let reasoning = chunk
            .reasoning
            .as_deref()
            .filter(|text| !text.is_empty() && self.context.reasoning);
        let text = chunk.text.as_deref().filter(|text| !text.is_empty());

        // Continue the open block first; otherwise reasoning precedes text
        if matches!(self.state, TranslatorState::TextActive { .. }) {
            self.append(BlockKind::Text, text, &mut events);
            self.append(BlockKind::Thinking, reasoning, &mut events);
        } else {
            self.append(BlockKind::Thinking, reasoning, &mut events);
            self.append(BlockKind::Text, text, &mut events);
        }

        if let Some(usage) = chunk.usage {
            self.context.usage = Some(usage);
        }

        if let Some(reason) = chunk.stop_reason {
            self.context.stop_reason = Some(reason);
            self.stop(&mut events);
        }

        events
    }

    /// Close the stream after the upstream ended without a stop reason
    pub fn finish(&mut self) -> Vec<NormalizedEvent> {
        let mut events = Vec::new();

        if !self.is_stopped() {
            self.ensure_started(&mut events);
            self.stop(&mut events);
        }

        events
    }

    fn ensure_started(&mut self, events: &mut Vec<NormalizedEvent>) {
        if self.state == TranslatorState::NotStarted {
            events.push(NormalizedEvent::MessageStart {
                id: self.context.message_id.clone(),
                model: self.context.model.clone(),
            });
            self.state = TranslatorState::Started;
        }
    }

    fn append(&mut self, kind: BlockKind, text: Option<&str>, events: &mut Vec<NormalizedEvent>) {
        let Some(text) = text else {
            return;
        };

        let index = match self.state.open_block() {
            Some((index, open)) if open == kind => index,
            _ => {
                self.close_block(events);
                let index = self.context.next_index;
                self.context.next_index += 1;
                events.push(NormalizedEvent::ContentBlockStart { index, kind });
                self.state = TranslatorState::active(kind, index);
                index
            }
        };

        events.push(NormalizedEvent::ContentBlockDelta {
            index,
            kind,
            text: text.to_owned(),
        });
    }

    fn close_block(&mut self, events: &mut Vec<NormalizedEvent>) {
        if let Some((index, _)) = self.state.open_block() {
            events.push(NormalizedEvent::ContentBlockStop { index });
            self.state = TranslatorState::Started;
        }
    }

    fn stop(&mut self, events: &mut Vec<NormalizedEvent>) {
        self.close_block(events);
        events.push(NormalizedEvent::MessageDelta {
            usage: self.context.usage,
            stop_reason: Some(self.context.stop_reason.unwrap_or(StopReason::EndTurn)),
        });
        events.push(NormalizedEvent::MessageStop);
        self.state = TranslatorState::Stopped;
    }
}

/// Drive `translator` over an upstream chunk stream
///
/// The upstream is dropped as soon as the translator stops, which releases
/// the connection. An upstream error is forwarded and ends the stream
/// without `message_stop`.
pub fn translate_stream(chunks: ChunkStream, translator: StreamTranslator) -> EventStream {
    let events = stream::unfold(Some((chunks, translator)), |state| async move {
        let (mut chunks, mut translator) = state?;

        match chunks.next().await {
            Some(Ok(chunk)) => {
                let events: Vec<_> = translator.process(&chunk).into_iter().map(Ok).collect();
                let next = (!translator.is_stopped()).then_some((chunks, translator));
                Some((events, next))
            }
            Some(Err(e)) => {
                tracing::warn!(error = %e, message_id = translator.message_id(), "upstream stream failed");
                Some((vec![Err(e)], None))
            }
            None => Some((translator.finish().into_iter().map(Ok).collect(), None)),
        }
    })
    .flat_map(stream::iter);

    Box::pin(events)
}
