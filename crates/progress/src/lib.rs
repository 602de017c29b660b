//! Real-time submission progress stream client.
//!
//! Keeps a live index of what is happening to each submission
//! (queued, running, grading, graded or failed) by consuming the
//! platform's submission WebSocket topics. The connection reconnects
//! on its own with exponential backoff; callers only observe the
//! resulting [`adapter::StreamView`].
//!
//! Two parameterizations share one [`adapter::StreamAdapter`]:
//! a student stream scoped to the caller's own submissions and a
//! role-gated staff stream covering a whole assignment.

pub mod adapter;
pub mod config;
pub mod connection;
pub mod error;
pub mod messages;
pub mod reconnect;
pub mod scope;
pub mod store;
pub mod transport;

pub use adapter::{StaffStream, StreamAdapter, StreamContext, StreamView, StudentStream};
pub use connection::{ConnectionState, ReconcileOutcome};
pub use config::ProgressConfig;
pub use error::ProgressError;
pub use scope::{RoleAuthority, StaffScope, StaticRoles, StudentScope};
pub use store::{Mark, ProgressRecord, StoreMode};
