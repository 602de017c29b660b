//! `fitchfork-progress` -- submission progress watcher.
//!
//! Opens one student or staff submission stream and logs every change
//! to the live progress view until interrupted.
//!
//! # Environment variables
//!
//! | Variable                  | Required | Default   | Description                                   |
//! |---------------------------|----------|-----------|-----------------------------------------------|
//! | `FITCHFORK_TOKEN`         | yes      | --        | JWT sent as the `token` query parameter       |
//! | `FITCHFORK_MODULE_ID`     | yes      | --        | Module id                                     |
//! | `FITCHFORK_ASSIGNMENT_ID` | yes      | --        | Assignment id                                 |
//! | `FITCHFORK_USER_ID`       | student  | --        | Caller's user id                              |
//! | `FITCHFORK_STREAM`        | no       | `student` | `student` or `staff`                          |
//! | `FITCHFORK_ROLE`          | no       | --        | Caller's role in the module (staff gate)      |
//! | `FITCHFORK_ADMIN`         | no       | `false`   | Caller is a global admin (staff gate)         |
//! | `FITCHFORK_SINGLE_LATEST` | no       | `false`   | Keep only the most recent submission          |
//!
//! Connection tuning (`FITCHFORK_WS_BASE`, reconnect and keepalive
//! settings) is read by [`ProgressConfig::from_env`].

use std::sync::Arc;

use fitchfork_core::roles::ModuleRole;
use fitchfork_core::types::DbId;
use fitchfork_progress::scope::StreamScope;
use fitchfork_progress::{
    ProgressConfig, ProgressRecord, ReconcileOutcome, StaffScope, StaticRoles, StoreMode,
    StreamAdapter, StreamContext, StreamView, StudentScope,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fitchfork_progress=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ProgressConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        std::process::exit(1);
    });

    let ctx = StreamContext {
        token: std::env::var("FITCHFORK_TOKEN").ok(),
        module_id: env_id("FITCHFORK_MODULE_ID"),
        assignment_id: env_id("FITCHFORK_ASSIGNMENT_ID"),
        user_id: env_id("FITCHFORK_USER_ID"),
    };

    let mut roles = if env_flag("FITCHFORK_ADMIN") {
        StaticRoles::admin()
    } else {
        StaticRoles::new()
    };
    if let (Some(module_id), Ok(raw)) = (ctx.module_id, std::env::var("FITCHFORK_ROLE")) {
        match raw.parse::<ModuleRole>() {
            Ok(role) => roles = roles.with_role(module_id, role),
            Err(e) => {
                tracing::error!(error = %e, "FITCHFORK_ROLE is not a module role");
                std::process::exit(1);
            }
        }
    }

    let mode = if env_flag("FITCHFORK_SINGLE_LATEST") {
        StoreMode::SingleLatest
    } else {
        StoreMode::Accumulating
    };

    let stream = std::env::var("FITCHFORK_STREAM").unwrap_or_else(|_| "student".into());
    tracing::info!(
        stream = %stream,
        ws_base = %config.ws_base,
        module_id = ?ctx.module_id,
        assignment_id = ?ctx.assignment_id,
        "Starting fitchfork-progress",
    );

    match stream.as_str() {
        "student" => watch(StudentScope, config, roles, mode, ctx).await,
        "staff" => watch(StaffScope, config, roles, mode, ctx).await,
        other => {
            tracing::error!(stream = %other, "FITCHFORK_STREAM must be 'student' or 'staff'");
            std::process::exit(1);
        }
    }
}

/// Drive one adapter, logging view changes until Ctrl-C.
async fn watch<S: StreamScope>(
    scope: S,
    config: ProgressConfig,
    roles: StaticRoles,
    mode: StoreMode,
    ctx: StreamContext,
) {
    let mut adapter = StreamAdapter::new(scope, config)
        .with_authority(Arc::new(roles))
        .with_mode(mode);
    let mut rx = adapter.subscribe();

    if adapter.set_context(ctx) == ReconcileOutcome::Stopped {
        tracing::warn!(
            stream = S::NAME,
            "Missing inputs or insufficient role; staying disconnected",
        );
    }

    let mut log = ViewLog::default();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, closing stream");
                break;
            }
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = rx.borrow_and_update().clone();
                log.record(&view);
            }
        }
    }

    adapter.shutdown().await;
}

/// Which parts of a view update were logged.
#[derive(Debug, Default, PartialEq, Eq)]
struct Logged {
    connection: bool,
    error: bool,
    latest: bool,
}

/// Remembers what was last logged so repeated view updates stay quiet.
#[derive(Debug, Default)]
struct ViewLog {
    connected: bool,
    error: Option<String>,
    latest: Option<ProgressRecord>,
}

impl ViewLog {
    fn record(&mut self, view: &StreamView) -> Logged {
        let mut logged = Logged::default();

        if view.connected != self.connected {
            self.connected = view.connected;
            tracing::info!(connected = view.connected, state = ?view.state, "Connection changed");
            logged.connection = true;
        }

        if view.error != self.error {
            if let Some(error) = &view.error {
                tracing::warn!(error = %error, "Stream error");
                logged.error = true;
            }
            self.error = view.error.clone();
        }

        if view.latest != self.latest {
            if let Some(latest) = &view.latest {
                tracing::info!(
                    submission_id = latest.submission_id,
                    user_id = latest.user_id,
                    username = ?latest.username,
                    status = ?latest.status,
                    mark = ?latest.mark,
                    tracked = view.progress_by_id.len(),
                    "Latest submission progress",
                );
                logged.latest = true;
            }
            self.latest = view.latest.clone();
        }

        logged
    }
}

fn env_id(key: &str) -> Option<DbId> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(id) => Some(id),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring non-integer id");
            None
        }
    }
}

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}
