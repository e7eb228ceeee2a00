//! Server-sent-event framing of a stream's events.
//!
//! Turns an [`EventReceiver`] into the `data:` payloads of an
//! OpenAI-compatible chat completion stream:
//!
//! ```text
//! {"id":"chat-…","object":"chat.completion.chunk","model":"openspg/demo","choices":[{"index":0,"delta":{"role":"assistant","content":"step 1"}}]}
//! {"id":"chat-…", … "delta":{"role":"assistant","content":""},"finish_reason":"stop"}]}
//! [DONE]
//! ```
//!
//! Every chunk of one completion shares the same id. The HTTP layer only
//! needs to prefix each payload with `data: ` and terminate it with a blank
//! line (see [`Frame::to_sse`]).

use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use serde_json::Value;
use uuid::Uuid;

use crate::Result;
use crate::cache::key::is_falsy;
use crate::stream::{Event, EventReceiver};
use crate::types::{ChatCompletionChunk, FinishReason};

/// Terminal payload of every completion stream.
pub const DONE_MARKER: &str = "[DONE]";

/// Fresh completion id of the form `chat-<32 hex>`.
pub fn completion_id() -> String {
    format!("chat-{}", Uuid::new_v4().simple())
}

/// One SSE payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Chunk(ChatCompletionChunk),
    Done,
}

impl Frame {
    /// The `data:` field contents.
    pub fn to_data(&self) -> Result<String> {
        match self {
            Frame::Chunk(chunk) => Ok(serde_json::to_string(chunk)?),
            Frame::Done => Ok(DONE_MARKER.to_string()),
        }
    }

    /// A complete SSE message, `data: <payload>\n\n`.
    pub fn to_sse(&self) -> Result<String> {
        Ok(format!("data: {}\n\n", self.to_data()?))
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Frame::Done)
    }
}

/// Frame every event of `events` as chunks for `model`, followed by a stop
/// chunk and [`Frame::Done`].
///
/// Text events become content as-is, records become compact JSON text, and
/// nested streams are forwarded chunk by chunk. Empty text and empty records
/// are skipped.
pub fn frame_events(
    model: impl Into<String>,
    events: EventReceiver,
) -> impl Stream<Item = Frame> + Send + 'static {
    let model = model.into();
    let id = completion_id();

    let body = {
        let (id, model) = (id.clone(), model.clone());
        events
            .flat_map(event_contents)
            .map(move |content| {
                Frame::Chunk(ChatCompletionChunk::assistant(&id, &model, content, None))
            })
    };
    let tail = stream::iter([
        Frame::Chunk(ChatCompletionChunk::assistant(id, model, "", Some(FinishReason::Stop))),
        Frame::Done,
    ]);

    body.chain(tail)
}

/// [`frame_events`] rendered as `data:` payload strings.
pub fn frame_payloads(
    model: impl Into<String>,
    events: EventReceiver,
) -> impl Stream<Item = Result<String>> + Send + 'static {
    frame_events(model, events).map(|frame| frame.to_data())
}

fn event_contents(event: Event) -> BoxStream<'static, String> {
    match event {
        Event::Text(text) if text.is_empty() => stream::empty().boxed(),
        Event::Text(text) => stream::once(async move { text }).boxed(),
        Event::Record(value) if is_falsy(&value) => stream::empty().boxed(),
        Event::Record(Value::String(text)) => stream::once(async move { text }).boxed(),
        Event::Record(value) => {
            let text = value.to_string();
            stream::once(async move { text }).boxed()
        }
        Event::Stream(chunks) => chunks,
    }
}
