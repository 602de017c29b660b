//! Single-socket connection lifecycle.
//!
//! [`ConnectionManager`] owns at most one background task per target.
//! The task runs connect -> ping -> read frames -> close -> backoff ->
//! reconnect until its [`CancellationToken`] fires. Everything the task
//! observes is reported to a [`ConnectionHandler`] that lives on the task,
//! so handler state has exactly one writer.
//!
//! [`ConnectionManager::reconcile`] is the only way to change what the
//! manager is connected to. Calling it again with an identical target
//! is a no-op while the socket is open or connecting.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::runtime::Handle;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::Interval;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::error::ProgressError;
use crate::messages::PING_FRAME;
use crate::reconnect::ReconnectPolicy;
use crate::transport::{redact_token, Connection, Connector};

/// How long a graceful socket close may take before the task gives up on it.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// How long [`ConnectionManager::shutdown`] waits for the task to exit.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Where a connection points: a topic path under the WebSocket base plus the bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamTarget {
    ws_base: String,
    path: String,
    token: String,
}

impl StreamTarget {
    pub fn new(ws_base: impl Into<String>, path: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            ws_base: ws_base.into(),
            path: path.into(),
            token: token.into(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Full socket URL, e.g. `ws://host/ws/modules/1/assignments/2/submissions/5?token=...`.
    ///
    /// The token is percent-encoded; JWTs pass through unchanged.
    pub fn url(&self) -> String {
        let token: String = url::form_urlencoded::byte_serialize(self.token.as_bytes()).collect();
        format!(
            "{}/{}?token={}",
            self.ws_base.trim_end_matches('/'),
            self.path.trim_start_matches('/'),
            token
        )
    }

    /// The URL with the token masked, for logs.
    pub fn display_url(&self) -> String {
        redact_token(&self.url())
    }
}

/// Lifecycle of the managed socket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket and no reconnect pending.
    #[default]
    Disconnected,
    Connecting,
    Open,
    /// The socket closed and a reconnect timer is running.
    ClosedPendingReconnect,
}

/// Receives connection events on the connection task.
pub trait ConnectionHandler: Send + 'static {
    fn on_state(&mut self, state: ConnectionState);

    /// Called once per successful open, before any frame is delivered.
    fn on_open(&mut self);

    fn on_text(&mut self, text: &str);

    /// A connect attempt failed. `initial` is true only for the very
    /// first attempt against this target.
    fn on_connect_failed(&mut self, error: &ProgressError, initial: bool);
}

/// What [`ConnectionManager::reconcile`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Same target, socket open or connecting: nothing to do.
    Unchanged,
    /// Same target waiting on a backoff timer: the timer was skipped.
    RetriedNow,
    /// A new connection task was started.
    Started,
    /// No target: any existing connection was torn down.
    Stopped,
}

/// Settings applied to every connection task.
#[derive(Debug, Clone, Default)]
pub struct ConnectionOptions {
    pub reconnect: ReconnectPolicy,
    /// Re-send the ping frame on this interval while open. `None` pings once.
    pub keepalive_interval: Option<Duration>,
}

/// Bookkeeping for the one live connection task.
struct ActiveConnection {
    target: StreamTarget,
    cancel: CancellationToken,
    retry_now: Arc<Notify>,
    state: watch::Receiver<ConnectionState>,
    task: JoinHandle<()>,
}

/// Owns at most one connection task.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    options: ConnectionOptions,
    active: Option<ActiveConnection>,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>, options: ConnectionOptions) -> Self {
        Self {
            connector,
            options,
            active: None,
        }
    }

    /// Current state of the managed socket.
    pub fn state(&self) -> ConnectionState {
        match &self.active {
            Some(active) if !active.task.is_finished() => *active.state.borrow(),
            _ => ConnectionState::Disconnected,
        }
    }

    pub fn target(&self) -> Option<&StreamTarget> {
        self.active.as_ref().map(|a| &a.target)
    }

    /// True when no connection task is alive.
    pub fn is_idle(&self) -> bool {
        self.active.as_ref().map_or(true, |a| a.task.is_finished())
    }

    /// Point the manager at `target`.
    ///
    /// `make_handler` is only invoked when a new task is started. Starting
    /// a task outside a Tokio runtime tears down any existing connection
    /// and returns [`ProgressError::NoRuntime`].
    pub fn reconcile<H, F>(
        &mut self,
        target: Option<StreamTarget>,
        make_handler: F,
    ) -> Result<ReconcileOutcome, ProgressError>
    where
        H: ConnectionHandler,
        F: FnOnce() -> H,
    {
        let Some(target) = target else {
            self.dispose();
            return Ok(ReconcileOutcome::Stopped);
        };

        if let Some(active) = &self.active {
            if active.target == target && !active.task.is_finished() {
                let state = *active.state.borrow();
                match state {
                    ConnectionState::Open | ConnectionState::Connecting => {
                        return Ok(ReconcileOutcome::Unchanged);
                    }
                    ConnectionState::ClosedPendingReconnect => {
                        tracing::debug!(url = %target.display_url(), "Skipping reconnect backoff");
                        active.retry_now.notify_waiters();
                        return Ok(ReconcileOutcome::RetriedNow);
                    }
                    ConnectionState::Disconnected => {}
                }
            }
        }

        self.dispose();
        let runtime = Handle::try_current().map_err(|_| ProgressError::NoRuntime)?;
        self.active = Some(self.spawn(&runtime, target, make_handler()));
        Ok(ReconcileOutcome::Started)
    }

    /// Cancel the connection task (closing its socket and timer).
    ///
    /// Safe to call any number of times.
    pub fn dispose(&mut self) {
        if let Some(active) = self.active.take() {
            tracing::info!(url = %active.target.display_url(), "Stopping submission stream");
            active.cancel.cancel();
        }
    }

    /// Cancel the connection task and wait for it to exit.
    pub async fn shutdown(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
            let mut task = active.task;
            if tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut task).await.is_err() {
                tracing::warn!(url = %active.target.display_url(), "Connection task did not stop in time, aborting");
                task.abort();
            }
        }
    }

    fn spawn<H: ConnectionHandler>(
        &self,
        runtime: &Handle,
        target: StreamTarget,
        handler: H,
    ) -> ActiveConnection {
        let cancel = CancellationToken::new();
        let retry_now = Arc::new(Notify::new());
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);

        let task = runtime.spawn(run_connection_loop(
            Arc::clone(&self.connector),
            self.options.clone(),
            target.clone(),
            handler,
            state_tx,
            cancel.clone(),
            Arc::clone(&retry_now),
        ));

        ActiveConnection {
            target,
            cancel,
            retry_now,
            state: state_rx,
            task,
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Publishes state to both the manager and the handler.
struct StateReporter<H> {
    tx: watch::Sender<ConnectionState>,
    handler: H,
}

impl<H: ConnectionHandler> StateReporter<H> {
    fn set(&mut self, state: ConnectionState) {
        self.tx.send_replace(state);
        self.handler.on_state(state);
    }
}

/// Core connection loop: connect -> read frames -> back off -> reconnect.
///
/// Runs until `cancel` is triggered.
async fn run_connection_loop<H: ConnectionHandler>(
    connector: Arc<dyn Connector>,
    options: ConnectionOptions,
    target: StreamTarget,
    handler: H,
    state_tx: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
    retry_now: Arc<Notify>,
) {
    let url = target.url();
    let display_url = target.display_url();
    let mut reporter = StateReporter { tx: state_tx, handler };
    let mut attempt: u32 = 0;
    let mut initial = true;

    loop {
        reporter.set(ConnectionState::Connecting);
        tracing::info!(url = %display_url, attempt, "Connecting to submission stream");

        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = connector.connect(&url) => result,
        };

        match result {
            Ok(conn) => {
                attempt = 0;
                reporter.set(ConnectionState::Open);
                reporter.handler.on_open();
                tracing::info!(url = %display_url, "Submission stream open");

                run_session(conn, &mut reporter.handler, &options, &cancel).await;
                if cancel.is_cancelled() {
                    break;
                }
                tracing::info!(url = %display_url, "Submission stream closed");
            }
            Err(e) => {
                tracing::warn!(url = %display_url, error = %e, "Submission stream connect failed");
                reporter.handler.on_connect_failed(&e, initial);
            }
        }
        initial = false;

        let delay = options.reconnect.delay(attempt);
        attempt = attempt.saturating_add(1);

        // Register interest before publishing the state so a reconcile
        // that observes ClosedPendingReconnect cannot miss the wakeup.
        let skip = retry_now.notified();
        tokio::pin!(skip);
        skip.as_mut().enable();

        reporter.set(ConnectionState::ClosedPendingReconnect);
        tracing::info!(
            url = %display_url,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Reconnect scheduled",
        );

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
            _ = &mut skip => {
                attempt = 0;
            }
        }
    }

    reporter.set(ConnectionState::Disconnected);
    tracing::debug!(url = %display_url, "Connection task exited");
}

/// Drive one open socket until it closes, errors, or `cancel` fires.
async fn run_session<H: ConnectionHandler>(
    conn: Connection,
    handler: &mut H,
    options: &ConnectionOptions,
    cancel: &CancellationToken,
) {
    let Connection { mut sink, mut stream } = conn;

    if let Err(e) = sink.send(Message::Text(PING_FRAME.to_string())).await {
        let err = ProgressError::Protocol(format!("Failed to send ping: {e}"));
        tracing::warn!(error = %err, "Keepalive ping failed");
    }

    let mut keepalive = options.keepalive_interval.map(|period| {
        let mut iv = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        iv.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        iv
    });

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await;
                return;
            }
            _ = next_tick(&mut keepalive) => {
                if let Err(e) = sink.send(Message::Text(PING_FRAME.to_string())).await {
                    tracing::warn!(error = %e, "Keepalive ping failed");
                    return;
                }
            }
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => handler.on_text(&text),
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(?frame, "Server closed submission stream");
                        return;
                    }
                    Some(Ok(_)) => {
                        // Binary / Ping / Pong / raw frames carry nothing for us.
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "Submission stream receive error");
                        return;
                    }
                    None => {
                        tracing::debug!("Submission stream exhausted");
                        return;
                    }
                }
            }
        }
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(iv) => {
            iv.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_url_joins_base_path_and_token() {
        let t = StreamTarget::new("ws://host/ws/", "/modules/1/assignments/2/submissions/5", "T");
        assert_eq!(t.url(), "ws://host/ws/modules/1/assignments/2/submissions/5?token=T");
        assert_eq!(t.display_url(), "ws://host/ws/modules/1/assignments/2/submissions/5?token=***");
    }

    #[test]
    fn target_url_encodes_opaque_tokens() {
        let t = StreamTarget::new("ws://h/ws", "p", "a&b#c+d e");
        assert_eq!(t.url(), "ws://h/ws/p?token=a%26b%23c%2Bd+e");
        assert_eq!(t.display_url(), "ws://h/ws/p?token=***");

        let jwt = "eyJhbGciOiJIUzI1NiJ9.eyJzdWIiOjV9.abc-DEF_123";
        assert!(StreamTarget::new("ws://h/ws", "p", jwt).url().ends_with(jwt));
    }

    #[test]
    fn reconcile_without_runtime_is_an_error() {
        let mut manager = ConnectionManager::new(
            Arc::new(crate::transport::TungsteniteConnector),
            ConnectionOptions::default(),
        );
        let target = StreamTarget::new("ws://h/ws", "p", "T");
        let result = manager.reconcile(Some(target), || -> NullHandler { panic!("handler built without a runtime") });

        assert!(matches!(result, Err(ProgressError::NoRuntime)));
        assert!(manager.is_idle());
        assert!(matches!(manager.reconcile::<NullHandler, _>(None, || NullHandler), Ok(ReconcileOutcome::Stopped)));
    }

    struct NullHandler;

    impl ConnectionHandler for NullHandler {
        fn on_state(&mut self, _state: ConnectionState) {}
        fn on_open(&mut self) {}
        fn on_text(&mut self, _text: &str) {}
        fn on_connect_failed(&mut self, _error: &ProgressError, _initial: bool) {}
    }

    #[test]
    fn targets_compare_on_token_too() {
        let a = StreamTarget::new("ws://h", "p", "one");
        let b = StreamTarget::new("ws://h", "p", "two");
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn fresh_manager_is_disconnected() {
        let manager = ConnectionManager::new(
            Arc::new(crate::transport::TungsteniteConnector),
            ConnectionOptions::default(),
        );
        assert!(manager.is_idle());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(manager.target().is_none());
    }
}
