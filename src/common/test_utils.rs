use crate::duplex::DuplexMessage;
use crate::fault::CoinFlip;
use crate::http::InboundRequest;
use crate::identity::IdentityProvider;
use crate::observer::EchoObserver;
use crate::server::EchoServer;
use crate::{ServerConfig, Result};
use http::StatusCode;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// One notification captured by `RecordingObserver`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observed {
    Request(String),
    Plain(StatusCode),
    DuplexUpgraded,
    Echoed(DuplexMessage),
    DuplexClosed,
    Field(String, String),
    StreamEnded,
}

/// Observer that keeps every notification in memory
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    events: Arc<Mutex<Vec<Observed>>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<Observed> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    fn push(&self, event: Observed) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl EchoObserver for RecordingObserver {
    fn request_received(&self, request: &InboundRequest) {
        self.push(Observed::Request(request.path().to_string()));
    }

    fn plain_response(&self, _addr: SocketAddr, status: StatusCode) {
        self.push(Observed::Plain(status));
    }

    fn duplex_upgraded(&self, _addr: SocketAddr) {
        self.push(Observed::DuplexUpgraded);
    }

    fn duplex_echoed(&self, _addr: SocketAddr, message: &DuplexMessage) {
        self.push(Observed::Echoed(message.clone()));
    }

    fn duplex_closed(&self, _addr: SocketAddr) {
        self.push(Observed::DuplexClosed);
    }

    fn stream_field(&self, _addr: SocketAddr, field: &str, line: &str) {
        self.push(Observed::Field(field.to_string(), line.to_string()));
    }

    fn stream_ended(&self, _addr: SocketAddr) {
        self.push(Observed::StreamEnded);
    }
}

/// Starts a server on an ephemeral loopback port for integration tests
///
/// Returns the serving task and the address it is bound to.
pub async fn spawn_test_server(
    config: ServerConfig,
    identity: IdentityProvider,
    coin: Arc<dyn CoinFlip>,
    observer: Arc<dyn EchoObserver>,
) -> Result<(JoinHandle<Result<()>>, SocketAddr)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let server = EchoServer::new(config)
        .with_identity(identity)
        .with_coin(coin)
        .with_observer(observer);

    let server_handle = tokio::spawn(async move { server.serve(listener).await });

    Ok((server_handle, addr))
}
