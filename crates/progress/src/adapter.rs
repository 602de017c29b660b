//! Generic submission stream adapter.
//!
//! [`StreamAdapter`] turns caller context into a connection target,
//! feeds every inbound frame through the decoder into a
//! [`ProgressStore`], and publishes the resulting [`StreamView`] on a
//! `watch` channel. The student and staff streams are the same adapter
//! with a different [`StreamScope`].
//!
//! ```no_run
//! use fitchfork_progress::{ProgressConfig, StreamAdapter, StreamContext, StudentScope};
//!
//! # async fn demo() {
//! let mut stream = StreamAdapter::new(StudentScope, ProgressConfig::default());
//! stream.set_context(StreamContext {
//!     token: Some("jwt".into()),
//!     module_id: Some(1),
//!     assignment_id: Some(2),
//!     user_id: Some(5),
//! });
//!
//! let mut rx = stream.subscribe();
//! while rx.changed().await.is_ok() {
//!     if let Some(latest) = &rx.borrow().latest {
//!         println!("{} -> {:?}", latest.submission_id, latest.status);
//!     }
//! }
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use fitchfork_core::types::DbId;
use tokio::sync::watch;

use crate::config::ProgressConfig;
use crate::connection::{
    ConnectionHandler, ConnectionManager, ConnectionState, ReconcileOutcome, StreamTarget,
};
use crate::error::ProgressError;
use crate::messages::{decode_frame, InboundFrame, SubmissionStatusFrame};
use crate::scope::{RoleAuthority, StaffScope, StaticRoles, StreamScope, StudentScope};
use crate::store::{ProgressRecord, ProgressStore, StatusUpdate, StoreMode};
use crate::transport::{Connector, TungsteniteConnector};

pub use crate::scope::StreamContext;

/// Student stream: the caller's own submissions.
pub type StudentStream = StreamAdapter<StudentScope>;

/// Staff stream: every submission of an assignment.
pub type StaffStream = StreamAdapter<StaffScope>;

/// Read model exposed to UI collaborators.
#[derive(Debug, Clone, Default)]
pub struct StreamView {
    pub connected: bool,
    pub state: ConnectionState,
    pub error: Option<String>,
    /// Last non-control frame received, as raw JSON.
    pub last_event: Option<serde_json::Value>,
    pub progress_by_id: HashMap<DbId, ProgressRecord>,
    /// Most recently updated record, recomputed on every store change.
    pub latest: Option<ProgressRecord>,
    /// Bumped on every target change; writes from older connections are ignored.
    generation: u64,
}

/// Connection + store pipeline for one target. Lives on the connection task.
struct StreamPipeline<S> {
    scope: Arc<S>,
    ctx: StreamContext,
    assignment_id: DbId,
    store: ProgressStore,
    view: Arc<watch::Sender<StreamView>>,
    generation: u64,
}

impl<S: StreamScope> StreamPipeline<S> {
    /// Apply `f` to the shared view unless a newer target has taken over.
    fn publish(&self, f: impl FnOnce(&mut StreamView)) {
        let generation = self.generation;
        self.view.send_if_modified(|v| {
            if v.generation != generation {
                return false;
            }
            f(v);
            true
        });
    }

    fn merge(&mut self, frame: SubmissionStatusFrame, raw: serde_json::Value) {
        let Some(owner) = self.scope.owner(&frame, &self.ctx) else {
            tracing::debug!(
                stream = S::NAME,
                submission_id = frame.submission_id,
                "Status frame missing owner, not merged",
            );
            self.publish(|v| v.last_event = Some(raw));
            return;
        };

        let record = self.store.apply(StatusUpdate {
            submission_id: frame.submission_id,
            assignment_id: self.assignment_id,
            owner,
            status: frame.status,
            timestamp: frame.ts,
            message: frame.message,
            mark: frame.mark,
        });
        tracing::debug!(
            stream = S::NAME,
            submission_id = record.submission_id,
            status = ?record.status,
            "Submission progress merged",
        );

        let progress = self.store.records().clone();
        let latest = self.store.latest().cloned();
        self.publish(|v| {
            v.last_event = Some(raw);
            v.progress_by_id = progress;
            v.latest = latest;
        });
    }
}

impl<S: StreamScope> ConnectionHandler for StreamPipeline<S> {
    fn on_state(&mut self, state: ConnectionState) {
        self.publish(|v| {
            v.state = state;
            v.connected = state == ConnectionState::Open;
        });
    }

    fn on_open(&mut self) {
        self.publish(|v| v.error = None);
    }

    fn on_text(&mut self, text: &str) {
        let Some((frame, raw)) = decode_frame(text) else {
            tracing::trace!(stream = S::NAME, "Dropping non-JSON frame");
            return;
        };

        match frame {
            InboundFrame::Control(control) => {
                tracing::debug!(stream = S::NAME, ?control, "Control frame");
            }
            InboundFrame::Status(status) => self.merge(status, raw),
            InboundFrame::Unrecognized => {
                tracing::trace!(stream = S::NAME, "Unrecognized frame kept as last event");
                self.publish(|v| v.last_event = Some(raw));
            }
        }
    }

    fn on_connect_failed(&mut self, error: &ProgressError, initial: bool) {
        if initial {
            let message = error.to_string();
            self.publish(|v| v.error = Some(message));
        }
    }
}

/// A self-reconnecting submission stream for one caller.
pub struct StreamAdapter<S: StreamScope> {
    scope: Arc<S>,
    config: ProgressConfig,
    authority: Arc<dyn RoleAuthority>,
    mode: StoreMode,
    ctx: StreamContext,
    manager: ConnectionManager,
    view: Arc<watch::Sender<StreamView>>,
}

impl<S: StreamScope> StreamAdapter<S> {
    /// Create an idle adapter. Nothing connects until [`set_context`](Self::set_context)
    /// supplies complete inputs.
    pub fn new(scope: S, config: ProgressConfig) -> Self {
        let manager = ConnectionManager::new(Arc::new(TungsteniteConnector), config.connection_options());
        let (view, _) = watch::channel(StreamView::default());
        Self {
            scope: Arc::new(scope),
            config,
            authority: Arc::new(StaticRoles::new()),
            mode: StoreMode::default(),
            ctx: StreamContext::default(),
            manager,
            view: Arc::new(view),
        }
    }

    /// Replace the transport. Only takes effect before the first connection.
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.manager.dispose();
        self.manager = ConnectionManager::new(connector, self.config.connection_options());
        self
    }

    pub fn with_authority(mut self, authority: Arc<dyn RoleAuthority>) -> Self {
        self.authority = authority;
        self
    }

    pub fn with_mode(mut self, mode: StoreMode) -> Self {
        self.mode = mode;
        self
    }

    /// Update caller inputs and reconcile the connection.
    pub fn set_context(&mut self, ctx: StreamContext) -> ReconcileOutcome {
        self.ctx = ctx;
        self.reconcile()
    }

    /// Swap the role collaborator (e.g. once roles finish loading) and reconcile.
    pub fn set_authority(&mut self, authority: Arc<dyn RoleAuthority>) -> ReconcileOutcome {
        self.authority = authority;
        self.reconcile()
    }

    pub fn context(&self) -> &StreamContext {
        &self.ctx
    }

    /// The target current inputs resolve to, `None` when the stream must stay closed.
    pub fn target(&self) -> Option<StreamTarget> {
        let token = self.ctx.token()?;
        if !self.scope.permits(&self.ctx, self.authority.as_ref()) {
            return None;
        }
        let path = self.scope.topic_path(&self.ctx)?;
        Some(StreamTarget::new(self.config.ws_base.clone(), path, token))
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.manager.state()
    }

    /// True when no connection task is running.
    pub fn is_idle(&self) -> bool {
        self.manager.is_idle()
    }

    /// Snapshot of the read model.
    pub fn view(&self) -> StreamView {
        self.view.borrow().clone()
    }

    /// Receive every change to the read model.
    pub fn subscribe(&self) -> watch::Receiver<StreamView> {
        self.view.subscribe()
    }

    /// Close the socket, cancel any reconnect timer and clear the read model.
    ///
    /// Idempotent; also runs on drop.
    pub fn dispose(&mut self) {
        self.manager.dispose();
        self.reset_view();
    }

    /// Like [`dispose`](Self::dispose) but waits for the connection task to exit.
    pub async fn shutdown(&mut self) {
        self.manager.shutdown().await;
        self.reset_view();
    }

    fn reconcile(&mut self) -> ReconcileOutcome {
        let target = self.target();
        if target.is_none() {
            tracing::debug!(stream = S::NAME, "No stream target for current inputs");
        }

        let assignment_id = self.ctx.assignment_id.unwrap_or_default();
        let scope = Arc::clone(&self.scope);
        let ctx = self.ctx.clone();
        let view = Arc::clone(&self.view);
        let mode = self.mode;

        // Runs after the previous task was cancelled and before the new
        // one is spawned, so the fresh view can't be clobbered by either.
        let result = self.manager.reconcile(target, move || {
            let mut generation = 0;
            view.send_modify(|v| {
                generation = v.generation + 1;
                *v = StreamView {
                    state: ConnectionState::Connecting,
                    generation,
                    ..StreamView::default()
                };
            });
            StreamPipeline {
                scope,
                ctx,
                assignment_id,
                store: ProgressStore::new(mode),
                view,
                generation,
            }
        });

        match result {
            Ok(ReconcileOutcome::Stopped) => {
                self.reset_view();
                ReconcileOutcome::Stopped
            }
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(stream = S::NAME, error = %e, "Cannot start submission stream");
                self.reset_view();
                let message = e.to_string();
                self.view.send_modify(|v| v.error = Some(message));
                ReconcileOutcome::Stopped
            }
        }
    }

    fn reset_view(&self) {
        self.view.send_if_modified(|v| {
            let fresh = StreamView {
                generation: v.generation + 1,
                ..StreamView::default()
            };
            let changed = v.connected
                || v.state != ConnectionState::Disconnected
                || v.error.is_some()
                || v.last_event.is_some()
                || !v.progress_by_id.is_empty();
            *v = fresh;
            changed
        });
    }
}

impl<S: StreamScope> Drop for StreamAdapter<S> {
    fn drop(&mut self) {
        self.manager.dispose();
    }
}
