use super::{EventSequencer, EventStreamCodec, StreamEvent};
use crate::http::{InboundRequest, Response, encode_head};
use crate::identity::ServerIdentity;
use crate::observer::EchoObserver;
use crate::plain::EchoPayload;
use crate::{EchoError, Result};
use chrono::{Local, SecondsFormat};
use futures_util::SinkExt;
use http::header::{
    ACCESS_CONTROL_ALLOW_ORIGIN, CACHE_CONTROL, CONNECTION, CONTENT_TYPE, TRANSFER_ENCODING,
};
use http::{HeaderMap, HeaderValue, StatusCode, Version};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt, DuplexStream};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;

/// A writer that may or may not deliver bytes to the peer incrementally
pub trait StreamingTransport: AsyncWrite + Unpin {
    fn supports_flush(&self) -> bool {
        true
    }
}

impl<T: StreamingTransport + ?Sized> StreamingTransport for &mut T {
    fn supports_flush(&self) -> bool {
        (**self).supports_flush()
    }
}

impl StreamingTransport for TcpStream {}

impl StreamingTransport for OwnedWriteHalf {}

impl StreamingTransport for DuplexStream {}

/// Collects the whole response before anyone can read it
impl StreamingTransport for Vec<u8> {
    fn supports_flush(&self) -> bool {
        false
    }
}

/// How a push stream ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// Cancellation fired; `last_id` is the id of the final event sent
    ClientDisconnected { last_id: u64 },
}

enum Wake {
    Heartbeat,
    Cancelled,
}

/// Streams `server`, `request` and then one `time` event per interval
#[derive(Debug, Clone)]
pub struct PushStreamResponder {
    heartbeat: Duration,
}

impl Default for PushStreamResponder {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl PushStreamResponder {
    pub fn new(heartbeat: Duration) -> Self {
        Self { heartbeat }
    }

    /// Runs an HTTP/1.x stream until `cancel` fires.
    ///
    /// Fails with `StreamingUnsupported` after sending a 500 when the
    /// transport cannot flush. Write failures end the stream with an error.
    pub async fn respond<W>(
        &self,
        mut transport: W,
        request: &InboundRequest,
        identity: ServerIdentity<'_>,
        cancel: CancellationToken,
        observer: &dyn EchoObserver,
    ) -> Result<StreamOutcome>
    where
        W: StreamingTransport,
    {
        if !transport.supports_flush() {
            Response::error(StatusCode::INTERNAL_SERVER_ERROR, "Streaming unsupported!")
                .write_to(&mut transport, request.version, false)
                .await?;
            return Err(EchoError::StreamingUnsupported);
        }

        let chunked = request.version != Version::HTTP_10;
        transport
            .write_all(&stream_head(request.version, chunked))
            .await?;
        transport.flush().await?;

        let sink = FramedWrite::new(transport, EventStreamCodec::new(chunked));
        self.run(sink, request, identity, cancel, observer).await
    }

    /// Writes bare events to `body` until `cancel` fires.
    ///
    /// For protocols that frame the response body themselves; the caller
    /// sends the head from `event_stream_headers`.
    pub async fn stream_events<W>(
        &self,
        body: W,
        request: &InboundRequest,
        identity: ServerIdentity<'_>,
        cancel: CancellationToken,
        observer: &dyn EchoObserver,
    ) -> Result<StreamOutcome>
    where
        W: AsyncWrite + Unpin,
    {
        let sink = FramedWrite::new(body, EventStreamCodec::new(false));
        self.run(sink, request, identity, cancel, observer).await
    }

    async fn run<W>(
        &self,
        mut sink: FramedWrite<W, EventStreamCodec>,
        request: &InboundRequest,
        identity: ServerIdentity<'_>,
        cancel: CancellationToken,
        observer: &dyn EchoObserver,
    ) -> Result<StreamOutcome>
    where
        W: AsyncWrite + Unpin,
    {
        let addr = request.remote_addr;
        let mut sequencer = EventSequencer::new();

        if let Some(hostname) = identity.disclosed_hostname() {
            let event = sequencer.next_event("server", hostname);
            emit(&mut sink, event, addr, observer).await?;
        }
        let echo = EchoPayload::render(request);
        let event = sequencer.next_event("request", echo.into_string());
        emit(&mut sink, event, addr, observer).await?;

        let mut ticker = interval_at(Instant::now() + self.heartbeat, self.heartbeat);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let wake = tokio::select! {
                biased;
                _ = cancel.cancelled() => Wake::Cancelled,
                _ = ticker.tick() => Wake::Heartbeat,
            };
            match wake {
                Wake::Cancelled => break,
                Wake::Heartbeat => {
                    let now = Local::now().to_rfc3339_opts(SecondsFormat::Secs, true);
                    let event = sequencer.next_event("time", now);
                    emit(&mut sink, event, addr, observer).await?;
                }
            }
        }

        observer.stream_ended(addr);
        Ok(StreamOutcome::ClientDisconnected {
            last_id: sequencer.last_id(),
        })
    }
}

/// Headers of an event-stream response that are valid on every protocol
pub fn event_stream_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers
}

fn stream_head(version: Version, chunked: bool) -> Vec<u8> {
    let mut headers = event_stream_headers();
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    if chunked {
        headers.insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
    }
    encode_head(version, StatusCode::OK, &headers)
}

/// Writes one event and flushes it to the peer
async fn emit<W>(
    sink: &mut FramedWrite<W, EventStreamCodec>,
    event: StreamEvent,
    addr: SocketAddr,
    observer: &dyn EchoObserver,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    for (field, line) in event.fields() {
        observer.stream_field(addr, field, &line);
    }
    sink.send(event).await?;
    Ok(())
}
