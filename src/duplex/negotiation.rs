use crate::http::{InboundRequest, encode_head, header_tokens};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::header::{CONNECTION, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_KEY, SEC_WEBSOCKET_VERSION, UPGRADE};
use http::{HeaderMap, HeaderValue, Method, StatusCode, Version};
use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;

#[derive(Debug, thiserror::Error)]
pub enum NegotiationError {
    #[error("missing 'upgrade' token in Connection header or 'websocket' in Upgrade header")]
    NotUpgrade,
    #[error("request method is not GET: {0}")]
    Method(Method),
    #[error("unsupported Sec-WebSocket-Version, expected 13")]
    Version,
    #[error("missing or malformed Sec-WebSocket-Key")]
    Key,
    #[error("handshake response could not be written: {0}")]
    Io(#[from] io::Error),
}

/// `Connection: upgrade` plus `Upgrade: websocket`, in any case
pub fn is_upgrade_attempt(headers: &HeaderMap) -> bool {
    header_tokens(headers, &CONNECTION).any(|t| t.eq_ignore_ascii_case("upgrade"))
        && header_tokens(headers, &UPGRADE).any(|t| t.eq_ignore_ascii_case("websocket"))
}

/// A validated upgrade request, ready to be answered with `101`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Negotiation {
    accept_key: String,
}

impl Negotiation {
    /// Validates the upgrade headers of `request`
    pub fn from_request(request: &InboundRequest) -> Result<Self, NegotiationError> {
        if !is_upgrade_attempt(&request.headers) {
            return Err(NegotiationError::NotUpgrade);
        }
        if request.method != Method::GET {
            return Err(NegotiationError::Method(request.method.clone()));
        }
        let version_ok = request
            .headers
            .get(SEC_WEBSOCKET_VERSION)
            .is_some_and(|v| v.as_bytes().trim_ascii() == b"13");
        if !version_ok {
            return Err(NegotiationError::Version);
        }

        let key = request
            .headers
            .get(SEC_WEBSOCKET_KEY)
            .map(|v| v.as_bytes().trim_ascii())
            .ok_or(NegotiationError::Key)?;
        match STANDARD.decode(key) {
            Ok(nonce) if nonce.len() == 16 => {}
            _ => return Err(NegotiationError::Key),
        }

        Ok(Self {
            accept_key: derive_accept_key(key),
        })
    }

    pub fn accept_key(&self) -> &str {
        &self.accept_key
    }

    /// The `101 Switching Protocols` response head
    pub fn response_head(&self) -> Vec<u8> {
        let mut headers = HeaderMap::new();
        headers.insert(UPGRADE, HeaderValue::from_static("websocket"));
        headers.insert(CONNECTION, HeaderValue::from_static("Upgrade"));
        if let Ok(accept) = HeaderValue::from_str(&self.accept_key) {
            headers.insert(SEC_WEBSOCKET_ACCEPT, accept);
        }
        encode_head(Version::HTTP_11, StatusCode::SWITCHING_PROTOCOLS, &headers)
    }

    /// Sends the handshake response
    pub async fn complete<W>(&self, stream: &mut W) -> Result<(), NegotiationError>
    where
        W: AsyncWrite + Unpin,
    {
        stream.write_all(&self.response_head()).await?;
        stream.flush().await?;
        Ok(())
    }
}
