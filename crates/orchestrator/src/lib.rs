//! Concurrent diagnostic fetches over a [`RemoteCaller`](slowscope_transport::RemoteCaller).
//!
//! [`Diagnostics`] is the caller-facing surface: an explore catalog, a ranked list of slow
//! query groups, and a full report that fetches every section at once. Each section runs as
//! its own task under its own deadline, so one failing or hanging fetch only degrades its
//! section.

mod config;
mod diagnostics;
mod listing;
mod report;
mod runner;
mod service;

pub use config::{
    ConfigError, DiagConfig, HelperConfig, ListingConfig, Result, SlowQueryConfig, Timeouts,
    ToolNames, ENV_CALL_TIMEOUT_MS, ENV_HELPER,
};
pub use diagnostics::{DiagnosticEntry, DiagnosticLog};
pub use listing::{parse_dashboards, parse_explores, parse_models, parse_saved_views};
pub use report::{AttemptSummary, DiagnosticReport, ExploreCatalog, SlowOperationsReport};
pub use runner::{run_all, FetchTask};
pub use service::Diagnostics;
