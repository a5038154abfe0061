use http::header::{CONNECTION, CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, StatusCode, Version};
use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Serializes a status line and header block
pub fn encode_head(version: Version, status: StatusCode, headers: &HeaderMap) -> Vec<u8> {
    let version = match version {
        Version::HTTP_10 => "HTTP/1.0",
        _ => "HTTP/1.1",
    };
    let mut head = format!(
        "{version} {} {}\r\n",
        status.as_u16(),
        status.canonical_reason().unwrap_or("")
    )
    .into_bytes();
    for (name, value) in headers {
        head.extend_from_slice(name.as_str().as_bytes());
        head.extend_from_slice(b": ");
        head.extend_from_slice(value.as_bytes());
        head.extend_from_slice(b"\r\n");
    }
    head.extend_from_slice(b"\r\n");
    head
}

/// A complete, length-delimited response
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: StatusCode, content_type: &'static str, body: impl Into<Vec<u8>>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// Plain-text error response
    pub fn error(status: StatusCode, message: &str) -> Self {
        Self::new(status, "text/plain; charset=utf-8", format!("{message}\n"))
    }

    /// Writes the response and flushes it.
    ///
    /// `keep_alive` controls the `Connection` header; an HTTP/1.0 peer is
    /// told explicitly when the connection stays open.
    pub async fn write_to<W>(mut self, w: &mut W, version: Version, keep_alive: bool) -> io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        self.headers
            .insert(CONTENT_LENGTH, HeaderValue::from(self.body.len()));
        if !keep_alive {
            self.headers.insert(CONNECTION, HeaderValue::from_static("close"));
        } else if version == Version::HTTP_10 {
            self.headers
                .insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        }

        let mut bytes = encode_head(version, self.status, &self.headers);
        bytes.extend_from_slice(&self.body);
        w.write_all(&bytes).await?;
        w.flush().await
    }
}
