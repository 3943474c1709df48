//! One-shot subprocess JSON-RPC transport.
//!
//! Every call spawns a fresh helper process, writes a single `tools/call` line to its stdin,
//! closes stdin and drains stdout/stderr until the process exits or the deadline passes. On
//! timeout the helper is killed; it is never trusted to stop on its own.

mod caller;
mod envelope;
mod error;
mod transport;

pub use caller::RemoteCaller;
pub use envelope::{parse, parse_correlated};
pub use error::{CallError, Result};
pub use transport::{
    next_correlation_id, HelperCommand, SubprocessTransport, DEFAULT_UNSUPPORTED_MARKERS,
};
