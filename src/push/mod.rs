//! Unidirectional server-sent event stream with heartbeat

pub mod event;
pub mod responder;


pub use event::{EventSequencer, EventStreamCodec, StreamEvent};
pub use responder::{PushStreamResponder, StreamOutcome, StreamingTransport, event_stream_headers};
