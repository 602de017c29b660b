//! In-memory index of submission progress.
//!
//! [`ProgressStore`] maps submission id to the latest known
//! [`ProgressRecord`]. Updates follow a "sticky" merge: `status` always
//! takes the incoming value, while `ts`, `message` and `mark` only
//! change when the update actually carries them.
//!
//! The store has a single writer (the connection task that owns it), so
//! it needs no interior locking.

use std::collections::HashMap;

use fitchfork_core::status::SubmissionStatus;
use fitchfork_core::types::{parse_timestamp, DbId};
use serde::{Deserialize, Serialize};

/// Marks awarded to a graded submission.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Mark {
    pub earned: f64,
    pub total: f64,
}

impl Mark {
    /// Earned marks as a percentage of the total, `None` when the total is not positive.
    pub fn percentage(&self) -> Option<f64> {
        (self.total > 0.0).then(|| self.earned / self.total * 100.0)
    }
}

/// Who a submission belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner {
    pub user_id: DbId,
    /// Only the staff topic reports usernames.
    pub username: Option<String>,
}

/// What is currently known about one submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressRecord {
    pub submission_id: DbId,
    pub assignment_id: DbId,
    pub user_id: DbId,
    pub username: Option<String>,
    pub status: Option<SubmissionStatus>,
    /// RFC 3339 timestamp of the most recent update that carried one.
    pub timestamp: Option<String>,
    pub message: Option<String>,
    pub mark: Option<Mark>,
}

impl ProgressRecord {
    fn empty(submission_id: DbId, assignment_id: DbId, owner: &Owner) -> Self {
        Self {
            submission_id,
            assignment_id,
            user_id: owner.user_id,
            username: owner.username.clone(),
            status: None,
            timestamp: None,
            message: None,
            mark: None,
        }
    }

    /// Milliseconds since the epoch for ordering; missing or unparseable timestamps sort as 0.
    pub fn sort_millis(&self) -> i64 {
        self.timestamp
            .as_deref()
            .and_then(|ts| parse_timestamp(ts).ok())
            .map_or(0, |ts| ts.timestamp_millis())
    }
}

/// One decoded status change, already resolved against the stream's context.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub submission_id: DbId,
    pub assignment_id: DbId,
    pub owner: Owner,
    pub status: SubmissionStatus,
    pub timestamp: Option<String>,
    pub message: Option<String>,
    pub mark: Option<Mark>,
}

/// How much history the store keeps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StoreMode {
    /// Every submission ever observed keeps its own entry.
    #[default]
    Accumulating,
    /// Only the most recently updated submission is kept.
    SingleLatest,
}

/// Submission id -> progress index.
#[derive(Debug, Clone, Default)]
pub struct ProgressStore {
    mode: StoreMode,
    records: HashMap<DbId, ProgressRecord>,
}

impl ProgressStore {
    pub fn new(mode: StoreMode) -> Self {
        Self {
            mode,
            records: HashMap::new(),
        }
    }

    pub fn mode(&self) -> StoreMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, submission_id: DbId) -> Option<&ProgressRecord> {
        self.records.get(&submission_id)
    }

    pub fn records(&self) -> &HashMap<DbId, ProgressRecord> {
        &self.records
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Merge one update into the index and return the stored record.
    ///
    /// In [`StoreMode::SingleLatest`] every other submission is dropped
    /// first; a repeat update for the retained submission still merges.
    pub fn apply(&mut self, update: StatusUpdate) -> &ProgressRecord {
        let id = update.submission_id;

        if self.mode == StoreMode::SingleLatest {
            self.records.retain(|&k, _| k == id);
        }

        let record = self
            .records
            .entry(id)
            .or_insert_with(|| ProgressRecord::empty(id, update.assignment_id, &update.owner));

        record.status = Some(update.status);
        record.user_id = update.owner.user_id;
        record.username = update.owner.username;
        if update.timestamp.is_some() {
            record.timestamp = update.timestamp;
        }
        if update.message.is_some() {
            record.message = update.message;
        }
        if update.mark.is_some() {
            record.mark = update.mark;
        }

        record
    }

    /// The most recently updated record.
    ///
    /// Ordered by timestamp (missing counts as the epoch), ties broken by
    /// the larger submission id. `None` when the store is empty.
    pub fn latest(&self) -> Option<&ProgressRecord> {
        self.records
            .values()
            .max_by_key(|r| (r.sort_millis(), r.submission_id))
    }
}
