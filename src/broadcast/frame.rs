//! Wire framing for pushed events.
//!
//! Frames use the server-sent events text format: optional `event:` and
//! `id:` fields followed by one `data:` line per payload line and a blank
//! line terminating the message.

use serde::Serialize;
use std::fmt;

use crate::error::Result;

/// One event as delivered to every subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFrame {
    event: Option<String>,
    id: Option<String>,
    data: String,
}

impl EventFrame {
    /// A frame carrying `data` verbatim.
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            event: None,
            id: None,
            data: data.into(),
        }
    }

    /// A frame carrying `payload` serialized as JSON.
    pub fn json<T: Serialize + ?Sized>(payload: &T) -> Result<Self> {
        Ok(Self::new(serde_json::to_string(payload)?))
    }

    /// Set the event name.
    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    /// Set the event id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// The event name, if any.
    pub fn event(&self) -> Option<&str> {
        self.event.as_deref()
    }

    /// The event id, if any.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// The unframed payload.
    pub fn data(&self) -> &str {
        &self.data
    }

    /// Render the frame in wire format.
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for EventFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(event) = &self.event {
            writeln!(f, "event: {}", single_line(event))?;
        }
        if let Some(id) = &self.id {
            writeln!(f, "id: {}", single_line(id))?;
        }
        // A payload line break would otherwise end the message early
        for line in lines(&self.data) {
            writeln!(f, "data: {}", line)?;
        }
        writeln!(f)
    }
}

/// Split on CRLF, lone CR and lone LF, all of which end a line on the wire.
fn lines(value: &str) -> impl Iterator<Item = &str> {
    value
        .split("\r\n")
        .flat_map(|chunk| chunk.split(&['\r', '\n'][..]))
}

fn single_line(value: &str) -> &str {
    lines(value).next().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_frame() {
        let frame = EventFrame::json(&json!({"type": "update"})).unwrap();
        assert_eq!(frame.encode(), "data: {\"type\":\"update\"}\n\n");
    }

    #[test]
    fn test_named_event_with_id() {
        let frame = EventFrame::new("hello").with_event("greeting").with_id("42");
        assert_eq!(frame.encode(), "event: greeting\nid: 42\ndata: hello\n\n");
        assert_eq!(frame.event(), Some("greeting"));
        assert_eq!(frame.id(), Some("42"));
        assert_eq!(frame.data(), "hello");
    }

    #[test]
    fn test_multiline_data_is_split() {
        let frame = EventFrame::new("line one\r\nline two");
        assert_eq!(frame.encode(), "data: line one\ndata: line two\n\n");
    }

    #[test]
    fn test_event_name_cannot_inject_fields() {
        let frame = EventFrame::new("x").with_event("ping\ndata: forged");
        assert_eq!(frame.encode(), "event: ping\ndata: x\n\n");
    }

    #[test]
    fn test_lone_carriage_return_cannot_inject_fields() {
        let frame = EventFrame::new("x")
            .with_event("ping\rdata: forged")
            .with_id("7\rid: 8");
        let encoded = frame.encode();
        assert_eq!(encoded, "event: ping\nid: 7\ndata: x\n\n");
        assert!(!encoded.contains('\r'));
    }

    #[test]
    fn test_lone_carriage_return_splits_data() {
        let frame = EventFrame::new("one\rtwo\nthree\r\nfour");
        assert_eq!(
            frame.encode(),
            "data: one\ndata: two\ndata: three\ndata: four\n\n"
        );
    }

    #[test]
    fn test_empty_payload_still_framed() {
        assert_eq!(EventFrame::new("").encode(), "data: \n\n");
    }
}
