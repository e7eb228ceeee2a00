//! Events flowing from a pipeline worker to the transport.

use std::fmt;

use futures_util::stream::{BoxStream, Stream, StreamExt};
use serde_json::Value;

/// One item pushed by a worker and consumed once by the transport.
pub enum Event {
    /// Plain text content.
    Text(String),
    /// Structured record, framed as JSON text.
    Record(Value),
    /// Lazily produced text chunks, e.g. from a streaming model; the
    /// transport forwards each chunk as it arrives.
    Stream(BoxStream<'static, String>),
}

impl Event {
    /// Structured record with null fields stripped.
    pub fn record(value: Value) -> Self {
        Event::Record(strip_nulls(value))
    }

    /// Nested text stream.
    pub fn stream<S>(chunks: S) -> Self
    where
        S: Stream<Item = String> + Send + 'static,
    {
        Event::Stream(chunks.boxed())
    }

    /// Text content, if this is a text event.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Event::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Event::Record(value) => f.debug_tuple("Record").field(value).finish(),
            Event::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<String> for Event {
    fn from(text: String) -> Self {
        Event::Text(text)
    }
}

impl From<&str> for Event {
    fn from(text: &str) -> Self {
        Event::Text(text.to_string())
    }
}

impl From<Value> for Event {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => Event::Text(text),
            other => Event::record(other),
        }
    }
}

/// Remove null object fields at every depth.
pub fn strip_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, strip_nulls(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(strip_nulls).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strip_nulls_recurses_into_arrays() {
        let value = json!({"a": null, "b": [{"c": null, "d": 1}], "e": {"f": null}});
        assert_eq!(strip_nulls(value), json!({"b": [{"d": 1}], "e": {}}));
    }

    #[test]
    fn json_string_becomes_text() {
        let event = Event::from(json!("hi"));
        assert_eq!(event.as_text(), Some("hi"));
    }

    #[test]
    fn debug_hides_stream() {
        let event = Event::stream(futures_util::stream::empty());
        assert_eq!(format!("{event:?}"), "Stream(..)");
    }
}
