use crate::Result;
use async_trait::async_trait;

/// Common interface of a runnable echo server
#[async_trait]
pub trait EchoServerTrait {
    /// Starts the server and serves connections until shut down
    async fn run(&self) -> Result<()>;

    /// Returns a shutdown signal sender that can be used to gracefully shutdown the server
    fn shutdown_signal(&self) -> tokio::sync::broadcast::Sender<()>;
}
