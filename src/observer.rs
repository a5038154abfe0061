//! Logging collaborator invoked by the responders at well-defined points

use crate::duplex::DuplexMessage;
use crate::http::InboundRequest;
use http::StatusCode;
use std::fmt::Write;
use std::net::SocketAddr;
use tracing::{debug, info};

/// Side-channel notifications from the protocol state machines.
///
/// Every method has an empty default so observers only implement what they
/// care about. None of them influence wire behavior. Transport and
/// negotiation failures are not reported here; the responders return them.
pub trait EchoObserver: Send + Sync {
    fn request_received(&self, _request: &InboundRequest) {}

    fn plain_response(&self, _addr: SocketAddr, _status: StatusCode) {}

    fn duplex_upgraded(&self, _addr: SocketAddr) {}

    fn duplex_echoed(&self, _addr: SocketAddr, _message: &DuplexMessage) {}

    /// The client closed the channel cleanly
    fn duplex_closed(&self, _addr: SocketAddr) {}

    fn stream_field(&self, _addr: SocketAddr, _field: &str, _line: &str) {}

    fn stream_ended(&self, _addr: SocketAddr) {}
}

/// Observer that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl EchoObserver for NoopObserver {}

/// Production observer writing `tracing` events
#[derive(Debug, Default, Clone)]
pub struct TracingObserver {
    pub log_headers: bool,
    pub log_body: bool,
}

impl TracingObserver {
    pub fn new(log_headers: bool, log_body: bool) -> Self {
        Self {
            log_headers,
            log_body,
        }
    }
}

impl EchoObserver for TracingObserver {
    fn request_received(&self, request: &InboundRequest) {
        let addr = request.remote_addr;
        info!(%addr, method = %request.method, uri = %request.uri, "Request");

        if self.log_headers {
            for name in request.headers.keys() {
                let values: Vec<_> = request
                    .headers
                    .get_all(name)
                    .iter()
                    .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                    .collect();
                info!(%addr, header = %name, ?values, "Header");
            }
        }

        if self.log_body && !request.body.is_empty() {
            info!(%addr, size = request.body.len(), "Body\n{}", hex_dump(&request.body));
        }
    }

    fn plain_response(&self, addr: SocketAddr, status: StatusCode) {
        debug!(%addr, status = status.as_u16(), "Plain response");
    }

    fn duplex_upgraded(&self, addr: SocketAddr) {
        info!(%addr, "Upgraded to websocket");
    }

    fn duplex_echoed(&self, addr: SocketAddr, message: &DuplexMessage) {
        match message {
            DuplexMessage::Text(text) => info!(%addr, kind = "txt", %text, "Echoed"),
            DuplexMessage::Binary(data) => info!(%addr, kind = "bin", size = data.len(), "Echoed"),
        }
    }

    fn duplex_closed(&self, addr: SocketAddr) {
        info!(%addr, "Websocket closed by client");
    }

    fn stream_field(&self, addr: SocketAddr, field: &str, line: &str) {
        info!(%addr, kind = "sse", "{field}: {line}");
    }

    fn stream_ended(&self, addr: SocketAddr) {
        info!(%addr, "Event stream client disconnected");
    }
}

/// Renders bytes in the `hexdump -C` layout
pub fn hex_dump(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 4 + 16);
    for (row, chunk) in data.chunks(16).enumerate() {
        let _ = write!(out, "{:08x}  ", row * 16);
        for i in 0..16 {
            match chunk.get(i) {
                Some(b) => {
                    let _ = write!(out, "{b:02x} ");
                }
                None => out.push_str("   "),
            }
            if i == 7 {
                out.push(' ');
            }
        }
        out.push_str(" |");
        out.extend(chunk.iter().map(|&b| {
            if (0x20..0x7f).contains(&b) {
                b as char
            } else {
                '.'
            }
        }));
        out.push_str("|\n");
    }
    out
}
