//! WebSocket transport seam.
//!
//! [`Connector`] opens one socket for a URL and hands back its split
//! halves. [`TungsteniteConnector`] is the production implementation;
//! tests substitute an in-memory connector.

use std::pin::Pin;

use futures::{Sink, Stream, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use crate::error::ProgressError;

/// Outbound half of a live socket.
pub type FrameSink = Pin<Box<dyn Sink<Message, Error = WsError> + Send>>;

/// Inbound half of a live socket.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Message, WsError>> + Send>>;

/// A live WebSocket connection.
pub struct Connection {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

/// Opens WebSocket connections.
#[async_trait::async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<Connection, ProgressError>;
}

/// Connects with `tokio-tungstenite` (plain `ws://` or rustls `wss://`).
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

#[async_trait::async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> Result<Connection, ProgressError> {
        let (ws_stream, _response) = connect_async(url)
            .await
            .map_err(|e| ProgressError::Connection(format!("Failed to connect to {}: {e}", redact_token(url))))?;

        let (sink, stream) = ws_stream.split();
        Ok(Connection {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}

/// Strip the `token` query value so URLs can be logged.
pub fn redact_token(url: &str) -> String {
    match url.split_once("token=") {
        Some((head, tail)) => {
            let rest = tail.find('&').map_or("", |i| &tail[i..]);
            format!("{head}token=***{rest}")
        }
        None => url.to_string(),
    }
}
