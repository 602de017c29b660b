//! Per-module role names.
//!
//! These must match the values stored in the `user_module_roles` table.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A user's role within a single module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleRole {
    Lecturer,
    AssistantLecturer,
    Tutor,
    Student,
}

/// Module roles allowed to open the staff submission stream.
pub const STAFF_STREAM_ROLES: &[ModuleRole] = &[ModuleRole::Lecturer, ModuleRole::AssistantLecturer];

impl ModuleRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lecturer => "lecturer",
            Self::AssistantLecturer => "assistant_lecturer",
            Self::Tutor => "tutor",
            Self::Student => "student",
        }
    }

    /// Whether this role may watch every submission of an assignment.
    pub fn can_watch_all_submissions(self) -> bool {
        STAFF_STREAM_ROLES.contains(&self)
    }
}

impl FromStr for ModuleRole {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lecturer" => Ok(Self::Lecturer),
            "assistant_lecturer" | "assistant-lecturer" => Ok(Self::AssistantLecturer),
            "tutor" => Ok(Self::Tutor),
            "student" => Ok(Self::Student),
            _ => Err(CoreError::UnknownRole(s.to_string())),
        }
    }
}

impl fmt::Display for ModuleRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
