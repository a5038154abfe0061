use super::{DuplexMessage, Negotiation};
use crate::Result;
use crate::identity::ServerIdentity;
use crate::observer::EchoObserver;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::{Role, WebSocketConfig};

/// Upgrades a connection and echoes every data message back in order
#[derive(Debug, Clone)]
pub struct DuplexEchoResponder {
    max_message_size: usize,
}

impl DuplexEchoResponder {
    pub fn new(max_message_size: usize) -> Self {
        Self { max_message_size }
    }

    fn websocket_config(&self) -> WebSocketConfig {
        let mut config = WebSocketConfig::default();
        config.max_message_size = Some(self.max_message_size);
        config.max_frame_size = Some(self.max_message_size);
        config
    }

    /// Completes the handshake on `stream`, then runs the echo loop.
    ///
    /// `leftover` holds bytes the request reader received after the
    /// upgrade request; they are the start of the frame stream.
    pub async fn respond<S>(
        &self,
        mut stream: S,
        leftover: Vec<u8>,
        negotiation: &Negotiation,
        identity: ServerIdentity<'_>,
        addr: SocketAddr,
        observer: &dyn EchoObserver,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        negotiation.complete(&mut stream).await?;
        observer.duplex_upgraded(addr);

        let ws = WebSocketStream::from_partially_read(
            stream,
            leftover,
            Role::Server,
            Some(self.websocket_config()),
        )
        .await;
        self.echo(ws, identity.greeting(), addr, observer).await
    }

    /// Sends `greeting`, then echoes until the channel closes.
    ///
    /// Each echo is written before the next message is read. A close from
    /// the client ends the loop with `Ok`; any transport error is returned.
    pub async fn echo<S>(
        &self,
        mut ws: WebSocketStream<S>,
        greeting: String,
        addr: SocketAddr,
        observer: &dyn EchoObserver,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        ws.send(Message::Text(greeting)).await?;

        loop {
            let message = match ws.next().await {
                Some(Ok(message)) => message,
                Some(Err(e)) => return Err(e.into()),
                None => break,
            };

            let message = match DuplexMessage::try_from(message) {
                Ok(message) => message,
                Err(Message::Close(_)) => break,
                // Ping replies are queued by the protocol layer.
                Err(_) => continue,
            };

            ws.send(message.clone().into()).await?;
            observer.duplex_echoed(addr, &message);
        }

        observer.duplex_closed(addr);
        // The close reply may race the peer hanging up.
        let _ = ws.close(None).await;
        Ok(())
    }
}
