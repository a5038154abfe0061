use crate::classify::{Route, classify};
use crate::common::EchoServerTrait;
use crate::config::ServerConfig;
use crate::duplex::DuplexEchoResponder;
use crate::fault::{CoinFlip, ThreadRngCoin};
use crate::http::{InboundRequest, RequestReader, Response};
use crate::identity::{IdentityProvider, ServerIdentity};
use crate::observer::{EchoObserver, TracingObserver};
use crate::plain::PlainEchoResponder;
use crate::push::PushStreamResponder;
use crate::security::ConnectionTracker;
use crate::{EchoError, Result, h2c, static_page};
use async_trait::async_trait;
use http::Version;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::{signal, time::timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

/// Everything a connection needs, shared read-only across connections
pub(crate) struct Dispatcher {
    pub(crate) config: ServerConfig,
    pub(crate) identity: IdentityProvider,
    pub(crate) coin: Arc<dyn CoinFlip>,
    pub(crate) observer: Arc<dyn EchoObserver>,
}

/// Diagnostic echo server
///
/// Every connection is classified per request and handed to the plain,
/// duplex or push-stream responder.
///
/// # Examples
///
/// ```no_run
/// use echo_server::{EchoServer, EchoServerTrait, ServerConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = ServerConfig::from_env()?;
///     let server = EchoServer::new(config);
///     let shutdown_signal = server.shutdown_signal();
///
///     let server_handle = tokio::spawn(async move { server.run().await });
///
///     // Do other work...
///
///     let _ = shutdown_signal.send(());
///     server_handle.await??;
///     Ok(())
/// }
/// ```
pub struct EchoServer {
    config: ServerConfig,
    identity: IdentityProvider,
    coin: Arc<dyn CoinFlip>,
    observer: Arc<dyn EchoObserver>,
    shutdown_signal: Arc<tokio::sync::broadcast::Sender<()>>,
}

impl EchoServer {
    /// Creates a server with the machine's host name, a fair coin and
    /// `tracing` output
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_signal, _) = tokio::sync::broadcast::channel(1);
        let identity = IdentityProvider::from_system(config.send_server_hostname);
        let observer = TracingObserver::new(config.log_http_headers, config.log_http_body);
        Self {
            config,
            identity,
            coin: Arc::new(ThreadRngCoin),
            observer: Arc::new(observer),
            shutdown_signal: Arc::new(shutdown_signal),
        }
    }

    pub fn with_identity(mut self, identity: IdentityProvider) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_coin(mut self, coin: Arc<dyn CoinFlip>) -> Self {
        self.coin = coin;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn EchoObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Serves connections from an already bound listener until shutdown
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let address = listener.local_addr()?;
        info!(%address, "Echo server listening");

        let dispatcher = Arc::new(Dispatcher {
            config: self.config.clone(),
            identity: self.identity.clone(),
            coin: Arc::clone(&self.coin),
            observer: Arc::clone(&self.observer),
        });
        let tracker = Arc::new(ConnectionTracker::new(
            self.config.limits.max_concurrent_connections,
        ));
        let mut shutdown_rx = self.shutdown_signal.subscribe();

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, addr)) => {
                            let guard = match tracker.try_acquire() {
                                Ok(guard) => guard,
                                Err(e) => {
                                    warn!(%addr, error = %e, "Connection rejected");
                                    continue;
                                }
                            };
                            let current = guard.active_connections();
                            debug!(%addr, current, "Accepted connection");

                            let dispatcher = Arc::clone(&dispatcher);
                            let span = tracing::info_span!("connection", %addr);
                            tokio::spawn(async move {
                                let result = dispatcher.handle(stream, addr).instrument(span).await;
                                if let Err(e) = result {
                                    warn!(%addr, error = %e, "Connection ended with error");
                                }
                                drop(guard);
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
                _ = signal::ctrl_c() => {
                    info!("Received shutdown signal, stopping server");
                    break;
                }
                _ = shutdown_rx.recv() => {
                    info!("Received internal shutdown signal, stopping server");
                    break;
                }
            }
        }

        info!("Echo server stopped");
        Ok(())
    }
}

#[async_trait]
impl EchoServerTrait for EchoServer {
    /// Binds the configured address and serves until shutdown
    async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener).await
    }

    fn shutdown_signal(&self) -> tokio::sync::broadcast::Sender<()> {
        self.shutdown_signal.as_ref().clone()
    }
}

impl Dispatcher {
    /// Reads requests off one connection and answers each of them.
    ///
    /// A connection opening with the HTTP/2 preface is handed to `h2c`.
    async fn handle(self: Arc<Self>, mut stream: TcpStream, addr: SocketAddr) -> Result<()> {
        let limits = &self.config.limits;
        let mut reader = RequestReader::new(limits.max_header_size, limits.max_body_size);

        let preface = reader.starts_with(&mut stream, h2c::PREFACE);
        match timeout(limits.request_timeout, preface).await {
            Ok(Ok(true)) => {
                debug!(%addr, "HTTP/2 prior knowledge");
                let io = h2c::Prefixed::new(reader.into_leftover(), stream);
                return h2c::serve(io, Arc::clone(&self), addr).await;
            }
            Ok(Ok(false)) => {}
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return self.expired(&reader, addr),
        }

        loop {
            let read = timeout(limits.request_timeout, reader.read_request(&mut stream, addr)).await;
            let request = match read {
                Ok(Ok(Some(request))) => request,
                Ok(Ok(None)) => {
                    debug!(%addr, "Client closed connection");
                    return Ok(());
                }
                Ok(Err(e)) => {
                    if let Some(status) = e.status() {
                        // The peer may already be gone; the parse error is what matters.
                        let _ = Response::error(status, &e.to_string())
                            .write_to(&mut stream, Version::HTTP_11, false)
                            .await;
                    }
                    return Err(e.into());
                }
                Err(_) => return self.expired(&reader, addr),
            };

            self.observer.request_received(&request);
            let identity = self.identity.resolve(&request.headers);

            match classify(&request) {
                Route::Duplex(negotiation) => {
                    let leftover = reader.into_leftover();
                    return DuplexEchoResponder::new(limits.max_message_size)
                        .respond(
                            stream,
                            leftover,
                            &negotiation,
                            identity,
                            addr,
                            self.observer.as_ref(),
                        )
                        .await;
                }
                Route::PushStream => {
                    return self.push_stream(stream, &request, identity).await;
                }
                Route::StaticPage => {
                    static_page::response()
                        .write_to(&mut stream, request.version, request.keep_alive())
                        .await?;
                }
                Route::Plain => {
                    PlainEchoResponder::new(self.coin.as_ref())
                        .respond(&mut stream, &request, self.observer.as_ref())
                        .await?;
                }
            }

            if !request.keep_alive() {
                return Ok(());
            }
        }
    }

    /// An idle connection closes quietly; a half-received request is an error
    fn expired(&self, reader: &RequestReader, addr: SocketAddr) -> Result<()> {
        if reader.has_buffered() {
            return Err(EchoError::Timeout(format!(
                "request not received within {:?}",
                self.config.limits.request_timeout
            )));
        }
        debug!(%addr, "Idle connection timed out");
        Ok(())
    }

    /// Streams events until the read half reports the client gone
    async fn push_stream(
        &self,
        stream: TcpStream,
        request: &InboundRequest,
        identity: ServerIdentity<'_>,
    ) -> Result<()> {
        let (read_half, write_half) = stream.into_split();
        let cancel = CancellationToken::new();
        let watcher = tokio::spawn(watch_disconnect(read_half, cancel.clone()));

        let result = PushStreamResponder::new(self.config.heartbeat_interval)
            .respond(write_half, request, identity, cancel, self.observer.as_ref())
            .await;

        watcher.abort();
        result.map(|_| ())
    }
}

/// Cancels `cancel` once the peer closes its side or the socket fails
async fn watch_disconnect(mut reader: OwnedReadHalf, cancel: CancellationToken) {
    let mut buffer = [0u8; 1024];
    loop {
        match reader.read(&mut buffer).await {
            Ok(0) | Err(_) => break,
            Ok(_) => continue,
        }
    }
    cancel.cancel();
}
