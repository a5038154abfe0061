use crate::security::{SizeError, SizeValidator};
use bytes::{Bytes, BytesMut};
use http::header::{CONNECTION, CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri, Version};
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Header slots tried first; the parse is retried with more on overflow
const INITIAL_HEADER_SLOTS: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum HttpProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("HTTP parsing error: {0}")]
    HttpParse(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Incomplete request")]
    IncompleteRequest,
    #[error("Request head exceeds {0} bytes")]
    HeadersTooLarge(usize),
    #[error("{0}")]
    TooLarge(#[from] SizeError),
    #[error("Transfer-Encoding request bodies are not supported")]
    UnsupportedTransferEncoding,
}

impl HttpProtocolError {
    /// Status to answer with before closing, if the peer is still listening
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            HttpProtocolError::HttpParse(_) | HttpProtocolError::InvalidRequest(_) => {
                Some(StatusCode::BAD_REQUEST)
            }
            HttpProtocolError::HeadersTooLarge(_) => {
                Some(StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE)
            }
            HttpProtocolError::TooLarge(_) => Some(StatusCode::PAYLOAD_TOO_LARGE),
            HttpProtocolError::UnsupportedTransferEncoding => Some(StatusCode::NOT_IMPLEMENTED),
            HttpProtocolError::Io(_) | HttpProtocolError::IncompleteRequest => None,
        }
    }
}

/// A fully received HTTP/1.x request
///
/// Header names are case-insensitive; repeated headers keep every value in
/// arrival order. The body is delivered exactly as received.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub remote_addr: SocketAddr,
    /// One name per received header line, in arrival order
    pub header_order: Vec<HeaderName>,
}

impl InboundRequest {
    /// Parses one complete request from `raw`, ignoring trailing bytes
    ///
    /// # Examples
    ///
    /// ```
    /// use echo_server::InboundRequest;
    ///
    /// let raw = b"POST /echo HTTP/1.1\r\nHost: x\r\nContent-Length: 2\r\n\r\nhi";
    /// let request = InboundRequest::parse(raw, "127.0.0.1:5000".parse().unwrap()).unwrap();
    ///
    /// assert_eq!(request.path(), "/echo");
    /// assert_eq!(&request.body[..], b"hi");
    /// ```
    pub fn parse(raw: &[u8], remote_addr: SocketAddr) -> Result<Self, HttpProtocolError> {
        let head = parse_head(raw)?.ok_or(HttpProtocolError::IncompleteRequest)?;
        let body_len = body_length(&head.headers)?;
        let end = head.len.checked_add(body_len).ok_or_else(|| {
            HttpProtocolError::InvalidRequest(format!("Content-Length {body_len} out of range"))
        })?;
        let body = raw
            .get(head.len..end)
            .ok_or(HttpProtocolError::IncompleteRequest)?;
        Ok(head.into_request(Bytes::copy_from_slice(body), remote_addr))
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Every header line in the order it was received.
    ///
    /// Falls back to the map's grouped order when `header_order` does not
    /// describe `headers`.
    pub fn ordered_headers(&self) -> Vec<(&HeaderName, &HeaderValue)> {
        if self.header_order.len() != self.headers.len() {
            return self.headers.iter().collect();
        }
        let mut taken: HashMap<&HeaderName, usize> = HashMap::new();
        self.header_order
            .iter()
            .filter_map(|name| {
                let index = taken.entry(name).or_insert(0);
                let value = self.headers.get_all(name).iter().nth(*index);
                *index += 1;
                value.map(|value| (name, value))
            })
            .collect()
    }

    /// Whether the client expects the connection to stay open afterwards
    pub fn keep_alive(&self) -> bool {
        let mut close = false;
        let mut keep_alive = false;
        for token in header_tokens(&self.headers, &CONNECTION) {
            close |= token.eq_ignore_ascii_case("close");
            keep_alive |= token.eq_ignore_ascii_case("keep-alive");
        }
        match self.version {
            Version::HTTP_10 => keep_alive && !close,
            _ => !close,
        }
    }
}

/// Comma-separated tokens of every value of `name`, trimmed
pub fn header_tokens<'a>(
    headers: &'a HeaderMap,
    name: &HeaderName,
) -> impl Iterator<Item = &'a str> + 'a {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

struct RequestHead {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    header_order: Vec<HeaderName>,
    len: usize,
}

impl RequestHead {
    fn into_request(self, body: Bytes, remote_addr: SocketAddr) -> InboundRequest {
        InboundRequest {
            method: self.method,
            uri: self.uri,
            version: self.version,
            headers: self.headers,
            body,
            remote_addr,
            header_order: self.header_order,
        }
    }
}

fn parse_head(buf: &[u8]) -> Result<Option<RequestHead>, HttpProtocolError> {
    let mut slots = INITIAL_HEADER_SLOTS;
    loop {
        let mut headers = vec![httparse::EMPTY_HEADER; slots];
        let mut req = httparse::Request::new(&mut headers);
        match req.parse(buf) {
            Ok(httparse::Status::Complete(len)) => return build_head(&req, len).map(Some),
            Ok(httparse::Status::Partial) => return Ok(None),
            // Every header line takes at least three bytes, so this terminates.
            Err(httparse::Error::TooManyHeaders) if slots < buf.len() => slots *= 2,
            Err(e) => {
                return Err(HttpProtocolError::HttpParse(format!(
                    "Failed to parse headers: {e}"
                )));
            }
        }
    }
}

fn build_head(req: &httparse::Request<'_, '_>, len: usize) -> Result<RequestHead, HttpProtocolError> {
    let method = req
        .method
        .ok_or_else(|| HttpProtocolError::InvalidRequest("missing method".to_string()))
        .and_then(|m| {
            Method::from_bytes(m.as_bytes())
                .map_err(|e| HttpProtocolError::InvalidRequest(format!("method {m:?}: {e}")))
        })?;
    let uri = req
        .path
        .ok_or_else(|| HttpProtocolError::InvalidRequest("missing request target".to_string()))
        .and_then(|p| {
            p.parse::<Uri>()
                .map_err(|e| HttpProtocolError::InvalidRequest(format!("target {p:?}: {e}")))
        })?;
    let version = match req.version {
        Some(0) => Version::HTTP_10,
        _ => Version::HTTP_11,
    };

    let mut map = HeaderMap::with_capacity(req.headers.len());
    let mut order = Vec::with_capacity(req.headers.len());
    for header in req.headers.iter() {
        let name = HeaderName::from_bytes(header.name.as_bytes())
            .map_err(|e| HttpProtocolError::InvalidRequest(format!("header name: {e}")))?;
        let value = HeaderValue::from_bytes(header.value)
            .map_err(|e| HttpProtocolError::InvalidRequest(format!("header {name}: {e}")))?;
        order.push(name.clone());
        map.append(name, value);
    }

    Ok(RequestHead {
        method,
        uri,
        version,
        headers: map,
        header_order: order,
        len,
    })
}

fn body_length(headers: &HeaderMap) -> Result<usize, HttpProtocolError> {
    if headers.contains_key(TRANSFER_ENCODING) {
        return Err(HttpProtocolError::UnsupportedTransferEncoding);
    }

    let mut length: Option<usize> = None;
    for value in headers.get_all(CONTENT_LENGTH) {
        let parsed = value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .ok_or_else(|| {
                HttpProtocolError::InvalidRequest(format!("bad Content-Length {value:?}"))
            })?;
        match length {
            Some(existing) if existing != parsed => {
                return Err(HttpProtocolError::InvalidRequest(
                    "conflicting Content-Length headers".to_string(),
                ));
            }
            _ => length = Some(parsed),
        }
    }
    Ok(length.unwrap_or(0))
}

/// Reads consecutive requests off one connection
///
/// Bytes received past the end of a request stay buffered for the next
/// call, or for whoever takes over the connection via `into_leftover`.
#[derive(Debug)]
pub struct RequestReader {
    buffer: BytesMut,
    max_header_size: usize,
    body_validator: SizeValidator,
}

impl RequestReader {
    pub fn new(max_header_size: usize, max_body_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
            max_header_size,
            body_validator: SizeValidator::new(max_body_size),
        }
    }

    /// Returns `Ok(None)` when the peer closes cleanly between requests
    pub async fn read_request<R>(
        &mut self,
        stream: &mut R,
        remote_addr: SocketAddr,
    ) -> Result<Option<InboundRequest>, HttpProtocolError>
    where
        R: AsyncRead + Unpin,
    {
        let head = loop {
            if let Some(head) = parse_head(&self.buffer)? {
                if head.len > self.max_header_size {
                    return Err(HttpProtocolError::HeadersTooLarge(self.max_header_size));
                }
                break head;
            }
            if self.buffer.len() > self.max_header_size {
                return Err(HttpProtocolError::HeadersTooLarge(self.max_header_size));
            }
            if stream.read_buf(&mut self.buffer).await? == 0 {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Err(HttpProtocolError::IncompleteRequest);
            }
        };

        let body_len = body_length(&head.headers)?;
        self.body_validator.validate_size(body_len)?;

        // Bounded by the header and body limits checked above.
        let total = head.len + body_len;
        while self.buffer.len() < total {
            self.buffer.reserve(total - self.buffer.len());
            if stream.read_buf(&mut self.buffer).await? == 0 {
                return Err(HttpProtocolError::IncompleteRequest);
            }
        }

        let mut message = self.buffer.split_to(total);
        let body = message.split_off(head.len).freeze();
        Ok(Some(head.into_request(body, remote_addr)))
    }

    /// Buffers input until it either starts with all of `prefix` or
    /// diverges from it; the bytes stay buffered for `read_request`.
    ///
    /// Returns `false` on EOF before the whole prefix arrived.
    pub async fn starts_with<R>(&mut self, stream: &mut R, prefix: &[u8]) -> io::Result<bool>
    where
        R: AsyncRead + Unpin,
    {
        loop {
            let n = self.buffer.len().min(prefix.len());
            if self.buffer[..n] != prefix[..n] {
                return Ok(false);
            }
            if n == prefix.len() {
                return Ok(true);
            }
            if stream.read_buf(&mut self.buffer).await? == 0 {
                return Ok(false);
            }
        }
    }

    /// Whether part of a request has been received but not yet returned
    pub fn has_buffered(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Bytes already received but not consumed by any request
    pub fn into_leftover(self) -> Vec<u8> {
        self.buffer.to_vec()
    }
}
