use bytes::{BufMut, BytesMut};
use std::io;
use tokio_util::codec::Encoder;

/// One labeled event on a push stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEvent {
    pub id: u64,
    pub event: String,
    pub data: String,
}

impl StreamEvent {
    /// Field lines in wire order: `event`, one `data` per data line, `id`
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = Vec::with_capacity(3);
        fields.push(("event", self.event.clone()));
        fields.extend(self.data.split('\n').map(|line| ("data", line.to_string())));
        fields.push(("id", self.id.to_string()));
        fields
    }

    /// The event as `field: value` lines followed by a blank line
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(self.event.len() + self.data.len() + 32);
        for (field, line) in self.fields() {
            out.push_str(field);
            out.push_str(": ");
            out.push_str(&line);
            out.push('\n');
        }
        out.push('\n');
        out
    }
}

/// Hands out event ids for a single stream, starting at 1
#[derive(Debug, Default)]
pub struct EventSequencer {
    last: u64,
}

impl EventSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the next event, incrementing the id first
    pub fn next_event(&mut self, event: impl Into<String>, data: impl Into<String>) -> StreamEvent {
        self.last += 1;
        StreamEvent {
            id: self.last,
            event: event.into(),
            data: data.into(),
        }
    }

    /// Id of the most recently built event, 0 before the first
    pub fn last_id(&self) -> u64 {
        self.last
    }
}

/// Frames events for the wire, optionally as one HTTP chunk each
#[derive(Debug, Clone, Copy)]
pub struct EventStreamCodec {
    chunked: bool,
}

impl EventStreamCodec {
    pub fn new(chunked: bool) -> Self {
        Self { chunked }
    }
}

impl Encoder<StreamEvent> for EventStreamCodec {
    type Error = io::Error;

    fn encode(&mut self, item: StreamEvent, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = item.encode();
        if self.chunked {
            dst.reserve(payload.len() + 12);
            dst.put_slice(format!("{:x}\r\n", payload.len()).as_bytes());
            dst.put_slice(payload.as_bytes());
            dst.put_slice(b"\r\n");
        } else {
            dst.put_slice(payload.as_bytes());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequencer_starts_at_one() {
        let mut sequencer = EventSequencer::new();
        assert_eq!(sequencer.last_id(), 0);
        let ids: Vec<u64> = (0..4).map(|_| sequencer.next_event("time", "t").id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert_eq!(sequencer.last_id(), 4);
    }

    #[test]
    fn test_sequencers_are_independent() {
        let mut a = EventSequencer::new();
        let mut b = EventSequencer::new();
        a.next_event("x", "");
        a.next_event("x", "");
        assert_eq!(b.next_event("x", "").id, 1);
    }

    #[test]
    fn test_encode_single_line() {
        let event = StreamEvent {
            id: 1,
            event: "server".into(),
            data: "node-a".into(),
        };
        assert_eq!(event.encode(), "event: server\ndata: node-a\nid: 1\n\n");
    }

    #[test]
    fn test_encode_splits_data_lines() {
        let event = StreamEvent {
            id: 7,
            event: "request".into(),
            data: "{\n  \"a\": 1\n}".into(),
        };
        assert_eq!(
            event.encode(),
            "event: request\ndata: {\ndata:   \"a\": 1\ndata: }\nid: 7\n\n"
        );
    }

    #[test]
    fn test_trailing_newline_keeps_empty_data_line() {
        let event = StreamEvent {
            id: 2,
            event: "time".into(),
            data: "a\n".into(),
        };
        assert_eq!(event.encode(), "event: time\ndata: a\ndata: \nid: 2\n\n");
    }

    #[test]
    fn test_chunked_codec() {
        let event = StreamEvent {
            id: 1,
            event: "time".into(),
            data: "now".into(),
        };
        let payload = event.encode();

        let mut dst = BytesMut::new();
        EventStreamCodec::new(true).encode(event.clone(), &mut dst).unwrap();
        assert_eq!(dst, format!("{:x}\r\n{payload}\r\n", payload.len()).as_bytes());

        let mut dst = BytesMut::new();
        EventStreamCodec::new(false).encode(event, &mut dst).unwrap();
        assert_eq!(dst, payload.as_bytes());
    }
}
