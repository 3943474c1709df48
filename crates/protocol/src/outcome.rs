use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    UnsupportedTool,
    RemoteError,
    TransportStartFailure,
    Io,
    Internal,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::UnsupportedTool => "unsupported_tool",
            Self::RemoteError => "remote_error",
            Self::TransportStartFailure => "transport_start_failure",
            Self::Io => "io",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, JsonSchema)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Settled result of one concurrent fetch: always a value, possibly the default one.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
pub struct FetchOutcome<T> {
    pub value: T,
    pub error: Option<ErrorInfo>,
    pub timed_out: bool,
}

impl<T> FetchOutcome<T> {
    pub fn ok(value: T) -> Self {
        Self {
            value,
            error: None,
            timed_out: false,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

impl<T: Default> FetchOutcome<T> {
    pub fn failed(error: ErrorInfo) -> Self {
        let timed_out = error.kind == ErrorKind::Timeout;
        Self {
            value: T::default(),
            error: Some(error),
            timed_out,
        }
    }
}

/// A sub-fetch that did not produce data, as listed in reports.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, JsonSchema)]
pub struct DegradedFetch {
    pub task: String,
    pub kind: ErrorKind,
    pub message: String,
}

impl DegradedFetch {
    pub fn new(task: impl Into<String>, error: &ErrorInfo) -> Self {
        Self {
            task: task.into(),
            kind: error.kind,
            message: error.message.clone(),
        }
    }
}
