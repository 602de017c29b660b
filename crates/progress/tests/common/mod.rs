//! In-memory transport for driving stream adapters in tests.
//!
//! [`MockConnector`] hands every successful connect to the test as a
//! [`ServerSocket`], which can push frames to the client, read what the
//! client sent, and close the connection by being dropped.

#![allow(dead_code)]

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::channel::mpsc as fmpsc;
use futures::{SinkExt, Stream, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use fitchfork_progress::transport::{Connection, Connector};
use fitchfork_progress::{ProgressConfig, ProgressError, StreamContext, StreamView};
use fitchfork_progress::reconnect::ReconnectPolicy;

/// Config with a fake base URL and no jitter so delays are exact.
pub fn test_config() -> ProgressConfig {
    ProgressConfig {
        ws_base: "ws://test/ws".to_string(),
        reconnect: ReconnectPolicy {
            max_jitter: Duration::ZERO,
            ..ReconnectPolicy::default()
        },
        keepalive_interval: None,
    }
}

/// Student 5 in module 1, assignment 2, holding token "T".
pub fn student_ctx() -> StreamContext {
    StreamContext {
        token: Some("T".to_string()),
        module_id: Some(1),
        assignment_id: Some(2),
        user_id: Some(5),
    }
}

/// Server end of one accepted connection.
pub struct ServerSocket {
    pub url: String,
    to_client: fmpsc::UnboundedSender<Result<Message, WsError>>,
    from_client: fmpsc::UnboundedReceiver<Message>,
}

impl ServerSocket {
    pub fn send_json(&self, value: serde_json::Value) {
        self.send_text(&value.to_string());
    }

    pub fn send_text(&self, text: &str) {
        let _ = self.to_client.unbounded_send(Ok(Message::Text(text.to_string())));
    }

    /// Next frame the client wrote, or `None` once its sink is gone.
    pub async fn recv(&mut self) -> Option<Message> {
        self.from_client.next().await
    }
}

/// Connector that never touches the network.
#[derive(Default)]
pub struct MockConnector {
    attempts: AtomicUsize,
    live: Arc<AtomicUsize>,
    failing: AtomicBool,
    attempt_times: Mutex<Vec<Instant>>,
    accepted: Mutex<Option<mpsc::UnboundedSender<ServerSocket>>>,
}

impl MockConnector {
    /// Returns the connector plus the channel accepted sockets arrive on.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerSocket>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Self {
            accepted: Mutex::new(Some(tx)),
            ..Self::default()
        };
        (Arc::new(connector), rx)
    }

    /// Make every following connect fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Sockets whose client half has not been dropped yet.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Gaps between consecutive connect attempts.
    pub fn attempt_gaps(&self) -> Vec<Duration> {
        let times = self.attempt_times.lock().unwrap();
        times.windows(2).map(|w| w[1] - w[0]).collect()
    }
}

#[async_trait::async_trait]
impl Connector for MockConnector {
    async fn connect(&self, url: &str) -> Result<Connection, ProgressError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.attempt_times.lock().unwrap().push(Instant::now());

        if self.failing.load(Ordering::SeqCst) {
            return Err(ProgressError::Connection("connection refused".to_string()));
        }

        let (to_client, client_rx) = fmpsc::unbounded();
        let (client_tx, from_client) = fmpsc::unbounded();

        let accepted = self.accepted.lock().unwrap();
        if let Some(tx) = accepted.as_ref() {
            let _ = tx.send(ServerSocket {
                url: url.to_string(),
                to_client,
                from_client,
            });
        }

        self.live.fetch_add(1, Ordering::SeqCst);
        let stream = LiveStream {
            inner: client_rx,
            _guard: LiveGuard(Arc::clone(&self.live)),
        };
        Ok(Connection {
            sink: Box::pin(client_tx.sink_map_err(|_| WsError::ConnectionClosed)),
            stream: Box::pin(stream),
        })
    }
}

struct LiveGuard(Arc<AtomicUsize>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct LiveStream {
    inner: fmpsc::UnboundedReceiver<Result<Message, WsError>>,
    _guard: LiveGuard,
}

impl Stream for LiveStream {
    type Item = Result<Message, WsError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

/// Wait until the view satisfies `pred`, failing the test after a minute
/// of (possibly paused) time.
pub async fn wait_view<F>(rx: &mut watch::Receiver<StreamView>, pred: F) -> StreamView
where
    F: FnMut(&StreamView) -> bool,
{
    let view = tokio::time::timeout(Duration::from_secs(60), rx.wait_for(pred))
        .await
        .expect("timed out waiting for stream view")
        .expect("stream view channel closed");
    (*view).clone()
}

/// Poll `cond` until it holds, failing the test after a minute.
pub async fn wait_until<F>(mut cond: F)
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + Duration::from_secs(60);
    while !cond() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
