use crate::duplex::NegotiationError;
use crate::http::request::HttpProtocolError;
use crate::security::SizeError;
use thiserror::Error;

/// Error types for the echo-server library
#[derive(Error, Debug)]
pub enum EchoError {
    /// Socket-level errors (bind, accept, read, write)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request framing errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// The duplex upgrade handshake could not be completed
    #[error("Negotiation failure: {0}")]
    Negotiation(#[from] NegotiationError),

    /// Errors on a prior-knowledge HTTP/2 connection
    #[error("HTTP/2 error: {0}")]
    Http2(#[from] hyper::Error),

    /// Errors on an established duplex channel
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The transport cannot deliver a push stream incrementally
    #[error("Streaming unsupported")]
    StreamingUnsupported,

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A request was still incomplete when the request timeout expired
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// Request exceeded a configured size limit
    #[error("Too large: {0}")]
    TooLarge(#[from] SizeError),
}

impl From<HttpProtocolError> for EchoError {
    fn from(err: HttpProtocolError) -> Self {
        match err {
            HttpProtocolError::Io(e) => EchoError::Io(e),
            HttpProtocolError::TooLarge(e) => EchoError::TooLarge(e),
            HttpProtocolError::HeadersTooLarge(max) => {
                EchoError::Http(format!("Request head exceeds {max} bytes"))
            }
            HttpProtocolError::HttpParse(msg) => EchoError::Http(msg),
            HttpProtocolError::InvalidRequest(msg) => EchoError::Http(msg),
            HttpProtocolError::UnsupportedTransferEncoding => {
                EchoError::Http("Transfer-Encoding request bodies are not supported".to_string())
            }
            HttpProtocolError::IncompleteRequest => {
                EchoError::Http("Incomplete HTTP request".to_string())
            }
        }
    }
}

/// Result type for the echo-server library
pub type Result<T> = std::result::Result<T, EchoError>;

pub mod classify;
pub mod common;
pub mod config;
pub mod duplex;
pub mod fault;
pub mod h2c;
pub mod http;
pub mod identity;
pub mod observer;
pub mod plain;
pub mod push;
pub mod security;
pub mod server;
pub mod static_page;

// Re-export main types for convenience
pub use classify::{Route, classify};
pub use common::EchoServerTrait;
pub use config::ServerConfig;
pub use duplex::{DuplexEchoResponder, DuplexMessage};
pub use fault::{CoinFlip, FixedCoin, SeededCoin, ThreadRngCoin};
pub use http::InboundRequest;
pub use identity::{Hostname, IdentityProvider, ServerIdentity};
pub use observer::{EchoObserver, NoopObserver, TracingObserver};
pub use plain::{EchoPayload, PlainEchoResponder};
pub use push::{EventSequencer, PushStreamResponder, StreamEvent, StreamOutcome};
pub use server::EchoServer;
