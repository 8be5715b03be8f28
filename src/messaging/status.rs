//! # Status Reports
//!
//! Short textual outcomes pushed from subworkers to the coordinator after every
//! invoked job. Reports carry no correlation to the originating envelope; they
//! are a logging signal only.

use serde_json::Value;
use std::fmt;

use crate::constants::status::{DONE_PREFIX, FAILED};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusReport {
    /// The job produced a non-empty result, rendered as text
    Done(String),
    Failed,
}

/// A status payload as seen by the coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedStatus {
    Report(StatusReport),
    Unrecognized(String),
}

impl StatusReport {
    /// Report for a job result; `null` counts as an empty result
    pub fn from_result(result: Option<&Value>) -> Self {
        match result {
            None | Some(Value::Null) => Self::Failed,
            Some(Value::String(s)) => Self::Done(s.clone()),
            Some(other) => Self::Done(other.to_string()),
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done(_))
    }

    pub fn to_wire(&self) -> String {
        self.to_string()
    }

    /// Parse a wire payload. Prefixes are matched case-insensitively.
    pub fn parse(payload: &[u8]) -> ParsedStatus {
        let text = String::from_utf8_lossy(payload);
        let trimmed = text.trim();

        if trimmed.eq_ignore_ascii_case(FAILED) {
            return ParsedStatus::Report(Self::Failed);
        }

        match trimmed.get(..DONE_PREFIX.len()) {
            Some(prefix) if prefix.eq_ignore_ascii_case(DONE_PREFIX) => {
                ParsedStatus::Report(Self::Done(trimmed[DONE_PREFIX.len()..].to_string()))
            }
            _ => ParsedStatus::Unrecognized(text.into_owned()),
        }
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusReport::Done(value) => write!(f, "{DONE_PREFIX}{value}"),
            StatusReport::Failed => f.write_str(FAILED),
        }
    }
}
