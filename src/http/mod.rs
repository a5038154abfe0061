//! HTTP/1.x framing shared by all responders
//!
//! Requests are parsed incrementally with `httparse`; responses are written
//! directly to the connection so the push-stream and duplex responders can
//! take over the socket after the head is sent.

pub mod request;
pub mod response;

pub use request::{HttpProtocolError, InboundRequest, RequestReader, header_tokens};
pub use response::{Response, encode_head};
