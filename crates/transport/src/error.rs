use slowscope_protocol::{ErrorInfo, ErrorKind};
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CallError>;

#[derive(Error, Debug)]
pub enum CallError {
    #[error("{tool}: no response within {}ms", .after.as_millis())]
    Timeout { tool: String, after: Duration },

    #[error("{tool}: helper does not support this tool ({detail})")]
    UnsupportedTool { tool: String, detail: String },

    #[error("{tool}: remote error: {message}")]
    RemoteError {
        tool: String,
        code: Option<i64>,
        message: String,
    },

    #[error("failed to launch helper {program}: {source}")]
    TransportStartFailure {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool}: helper I/O failed: {source}")]
    Io {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("request encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

impl CallError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::UnsupportedTool { .. } => ErrorKind::UnsupportedTool,
            Self::RemoteError { .. } => ErrorKind::RemoteError,
            Self::TransportStartFailure { .. } => ErrorKind::TransportStartFailure,
            Self::Io { .. } => ErrorKind::Io,
            Self::Encode(_) => ErrorKind::Internal,
        }
    }

    pub fn to_info(&self) -> ErrorInfo {
        ErrorInfo::new(self.kind(), self.to_string())
    }
}
