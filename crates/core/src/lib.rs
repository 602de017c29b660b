//! Shared domain vocabulary for FitchFork clients.
//!
//! Holds the identifier aliases, submission status lifecycle and
//! per-module role names used by the progress stream client. Nothing in
//! this crate performs I/O.

pub mod error;
pub mod roles;
pub mod status;
pub mod types;
