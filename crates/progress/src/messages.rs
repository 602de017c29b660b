//! Submission stream frame types and decoder.
//!
//! The server sends JSON text frames. Most are keyed on an `"event"`
//! field; the keepalive reply may instead use `"type"`. This module
//! sorts every frame into one of three buckets: control chatter that is
//! acknowledged and dropped, a typed [`SubmissionStatusFrame`], or an
//! unrecognised JSON value kept only for observability.

use fitchfork_core::status::SubmissionStatus;
use fitchfork_core::types::DbId;
use serde::{Deserialize, Serialize};

use crate::store::Mark;

/// `"event"` value carried by submission progress frames.
pub const EVENT_SUBMISSION_STATUS: &str = "submission_status";

/// Keepalive frame sent by the client right after the socket opens.
pub const PING_FRAME: &str = r#"{"type":"ping"}"#;

/// Server frames that carry no domain data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFrame {
    /// `{"event":"ready"}` sent once the topic subscription is live.
    Ready,
    /// `{"event":"pong"}` or `{"type":"pong"}` answering our ping.
    Pong,
}

/// Payload of a `submission_status` frame.
///
/// `user_id` and `user_username` are only populated on the staff topic,
/// where one connection multiplexes many students.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionStatusFrame {
    pub submission_id: DbId,
    pub status: SubmissionStatus,
    #[serde(default)]
    pub ts: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub mark: Option<Mark>,
    #[serde(default)]
    pub user_id: Option<DbId>,
    #[serde(default)]
    pub user_username: Option<String>,
}

/// A classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Control(ControlFrame),
    Status(SubmissionStatusFrame),
    /// Valid JSON of any other shape.
    Unrecognized,
}

/// Decode one raw text frame, returning its classification alongside the
/// parsed JSON.
///
/// Returns `None` when the text is not JSON at all; callers drop those
/// silently and keep reading.
pub fn decode_frame(text: &str) -> Option<(InboundFrame, serde_json::Value)> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    Some((classify(&value), value))
}

/// Classify an already-parsed frame.
pub fn classify(value: &serde_json::Value) -> InboundFrame {
    let event = value.get("event").and_then(serde_json::Value::as_str);
    let kind = value.get("type").and_then(serde_json::Value::as_str);

    match (event, kind) {
        (Some("ready"), _) => InboundFrame::Control(ControlFrame::Ready),
        (Some("pong"), _) | (_, Some("pong")) => InboundFrame::Control(ControlFrame::Pong),
        (Some(EVENT_SUBMISSION_STATUS), _) => {
            match SubmissionStatusFrame::deserialize(value) {
                Ok(frame) => InboundFrame::Status(frame),
                Err(_) => InboundFrame::Unrecognized,
            }
        }
        _ => InboundFrame::Unrecognized,
    }
}
