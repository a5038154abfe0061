//! HTTP/2 over cleartext for clients that open with the HTTP/2 preface
//!
//! The plain echo, the static page and the push stream are served here.
//! Duplex upgrades only exist on HTTP/1.1 and are refused.

use crate::classify::{Route, classify};
use crate::http::{InboundRequest, Response};
use crate::plain::PlainEchoResponder;
use crate::push::{PushStreamResponder, event_stream_headers};
use crate::server::Dispatcher;
use crate::{Result, static_page};
use bytes::Bytes;
use futures_util::StreamExt;
use http::StatusCode;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::server::conn::http2;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, warn};

/// First bytes of every prior-knowledge HTTP/2 connection
pub const PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

type EchoBody = UnsyncBoxBody<Bytes, io::Error>;

/// A stream whose first reads replay bytes that were already consumed
#[derive(Debug)]
pub struct Prefixed<S> {
    prefix: Bytes,
    inner: S,
}

impl<S> Prefixed<S> {
    pub fn new(prefix: impl Into<Bytes>, inner: S) -> Self {
        Self {
            prefix: prefix.into(),
            inner,
        }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for Prefixed<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if !self.prefix.is_empty() {
            let n = self.prefix.len().min(buf.remaining());
            let chunk = self.prefix.split_to(n);
            buf.put_slice(&chunk);
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for Prefixed<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// Serves one HTTP/2 connection; `io` must still yield the preface
pub(crate) async fn serve<S>(io: S, dispatcher: Arc<Dispatcher>, addr: SocketAddr) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = service_fn(move |request: hyper::Request<Incoming>| {
        let dispatcher = Arc::clone(&dispatcher);
        async move { Ok::<_, Infallible>(respond(dispatcher, request, addr).await) }
    });

    http2::Builder::new(TokioExecutor::new())
        .serve_connection(TokioIo::new(io), service)
        .await?;
    Ok(())
}

async fn respond(
    dispatcher: Arc<Dispatcher>,
    request: hyper::Request<Incoming>,
    addr: SocketAddr,
) -> hyper::Response<EchoBody> {
    let (parts, body) = request.into_parts();
    let max_body_size = dispatcher.config.limits.max_body_size;
    let body = match Limited::new(body, max_body_size).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            let status = if e.downcast_ref::<LengthLimitError>().is_some() {
                StatusCode::PAYLOAD_TOO_LARGE
            } else {
                StatusCode::BAD_REQUEST
            };
            return full(Response::error(status, &e.to_string()));
        }
    };

    let request = InboundRequest {
        header_order: parts.headers.iter().map(|(name, _)| name.clone()).collect(),
        method: parts.method,
        uri: parts.uri,
        version: parts.version,
        headers: parts.headers,
        body,
        remote_addr: addr,
    };
    dispatcher.observer.request_received(&request);

    match classify(&request) {
        Route::Duplex(_) => full(Response::error(
            StatusCode::BAD_REQUEST,
            "WebSocket upgrades require HTTP/1.1",
        )),
        Route::StaticPage => full(static_page::response()),
        Route::Plain => {
            let response = PlainEchoResponder::new(dispatcher.coin.as_ref()).response(&request);
            dispatcher.observer.plain_response(addr, response.status);
            full(response)
        }
        Route::PushStream => push_stream(dispatcher, request),
    }
}

fn full(response: Response) -> hyper::Response<EchoBody> {
    let Response {
        status,
        headers,
        body,
    } = response;
    let body = Full::new(Bytes::from(body))
        .map_err(|never| -> io::Error { match never {} })
        .boxed_unsync();
    let mut out: hyper::Response<EchoBody> = hyper::Response::new(body);
    *out.status_mut() = status;
    *out.headers_mut() = headers;
    out
}

/// Streams events into the response body until the client drops it
fn push_stream(dispatcher: Arc<Dispatcher>, request: InboundRequest) -> hyper::Response<EchoBody> {
    let (writer, reader) = tokio::io::duplex(16 * 1024);
    let cancel = CancellationToken::new();
    let body_alive = cancel.clone().drop_guard();
    let addr = request.remote_addr;

    tokio::spawn(
        async move {
            let identity = dispatcher.identity.resolve(&request.headers);
            let result = PushStreamResponder::new(dispatcher.config.heartbeat_interval)
                .stream_events(
                    writer,
                    &request,
                    identity,
                    cancel.clone(),
                    dispatcher.observer.as_ref(),
                )
                .await;
            // A write racing the body being dropped fails; that is a disconnect too.
            if let Err(e) = result {
                if !cancel.is_cancelled() {
                    warn!(%addr, error = %e, "HTTP/2 event stream failed");
                }
            }
        }
        .in_current_span(),
    );

    let frames = ReaderStream::new(reader).map(move |chunk| {
        // Dropping the body drops the guard, which cancels the stream.
        let _alive = &body_alive;
        chunk.map(Frame::data)
    });
    let mut response: hyper::Response<EchoBody> =
        hyper::Response::new(StreamBody::new(frames).boxed_unsync());
    *response.headers_mut() = event_stream_headers();
    response
}
