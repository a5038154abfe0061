//! Persistent bidirectional echo over a WebSocket upgrade

pub mod message;
pub mod negotiation;
pub mod responder;


pub use message::DuplexMessage;
pub use negotiation::{Negotiation, NegotiationError, is_upgrade_attempt};
pub use responder::DuplexEchoResponder;
