//! Submission processing lifecycle.
//!
//! A submission moves `queued -> running -> grading -> graded`, or drops
//! out into one of the `failed_*` states. The server may introduce new
//! failure kinds at any time, so unknown strings are kept verbatim in
//! [`SubmissionStatus::Other`] rather than rejected.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Status of a submission as reported by the grading pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SubmissionStatus {
    Queued,
    Running,
    Grading,
    Graded,
    FailedUpload,
    FailedCompile,
    FailedExecution,
    FailedGrading,
    FailedInternal,
    FailedDisallowedCode,
    /// Any status string this client does not know about.
    Other(String),
}

impl SubmissionStatus {
    /// Wire representation, e.g. `"failed_compile"`.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Grading => "grading",
            Self::Graded => "graded",
            Self::FailedUpload => "failed_upload",
            Self::FailedCompile => "failed_compile",
            Self::FailedExecution => "failed_execution",
            Self::FailedGrading => "failed_grading",
            Self::FailedInternal => "failed_internal",
            Self::FailedDisallowedCode => "failed_disallowed_code",
            Self::Other(s) => s,
        }
    }

    /// True for every `failed_*` status, including ones unknown to this client.
    pub fn is_failed(&self) -> bool {
        match self {
            Self::FailedUpload
            | Self::FailedCompile
            | Self::FailedExecution
            | Self::FailedGrading
            | Self::FailedInternal
            | Self::FailedDisallowedCode => true,
            Self::Other(s) => s.starts_with("failed_"),
            _ => false,
        }
    }

    /// The pipeline has finished with this submission (graded or failed).
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Graded) || self.is_failed()
    }

    pub fn is_in_progress(&self) -> bool {
        matches!(self, Self::Queued | Self::Running | Self::Grading)
    }
}

impl From<String> for SubmissionStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "queued" => Self::Queued,
            "running" => Self::Running,
            "grading" => Self::Grading,
            "graded" => Self::Graded,
            "failed_upload" => Self::FailedUpload,
            "failed_compile" => Self::FailedCompile,
            "failed_execution" => Self::FailedExecution,
            "failed_grading" => Self::FailedGrading,
            "failed_internal" => Self::FailedInternal,
            "failed_disallowed_code" => Self::FailedDisallowedCode,
            _ => Self::Other(value),
        }
    }
}

impl From<&str> for SubmissionStatus {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<SubmissionStatus> for String {
    fn from(value: SubmissionStatus) -> Self {
        match value {
            SubmissionStatus::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn known_statuses_parse() {
        assert_eq!(SubmissionStatus::from("queued"), SubmissionStatus::Queued);
        assert_eq!(SubmissionStatus::from("graded"), SubmissionStatus::Graded);
        assert_eq!(
            SubmissionStatus::from("failed_disallowed_code"),
            SubmissionStatus::FailedDisallowedCode
        );
    }

    #[test]
    fn unknown_failure_is_kept_and_counts_as_failed() {
        let status = SubmissionStatus::from("failed_timeout");
        assert_matches!(&status, SubmissionStatus::Other(s) if s == "failed_timeout");
        assert!(status.is_failed());
        assert!(status.is_complete());
        assert!(!status.is_in_progress());
    }

    #[test]
    fn unknown_non_failure_is_neither_failed_nor_in_progress() {
        let status = SubmissionStatus::from("paused");
        assert!(!status.is_failed());
        assert!(!status.is_complete());
        assert!(!status.is_in_progress());
    }

    #[test]
    fn lifecycle_helpers() {
        assert!(SubmissionStatus::Running.is_in_progress());
        assert!(SubmissionStatus::Graded.is_complete());
        assert!(!SubmissionStatus::Graded.is_failed());
        assert!(SubmissionStatus::FailedCompile.is_complete());
    }

    #[test]
    fn serde_uses_wire_strings() {
        let json = serde_json::to_string(&SubmissionStatus::FailedCompile).unwrap();
        assert_eq!(json, r#""failed_compile""#);

        let parsed: SubmissionStatus = serde_json::from_str(r#""grading""#).unwrap();
        assert_eq!(parsed, SubmissionStatus::Grading);

        let other: SubmissionStatus = serde_json::from_str(r#""weird""#).unwrap();
        assert_eq!(other.to_string(), "weird");
    }
}
