use crate::diagnostics::DiagnosticEntry;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use slowscope_protocol::{
    DashboardSummary, DegradedFetch, ErrorInfo, GroupSummary, ModelExplores, SavedViewSummary,
};
use slowscope_search::AttemptStat;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default, JsonSchema)]
pub struct ExploreCatalog {
    pub models: Vec<ModelExplores>,
    pub degraded: Vec<DegradedFetch>,
}

/// One executed ladder step, flattened for reporting.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
pub struct AttemptSummary {
    pub label: String,
    pub runtime_floor: f64,
    pub time_window: String,
    pub limit: usize,
    pub total_rows: usize,
    pub new_records: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl From<&AttemptStat> for AttemptSummary {
    fn from(stat: &AttemptStat) -> Self {
        Self {
            label: stat.label.clone(),
            runtime_floor: stat.filter.runtime_floor,
            time_window: stat.filter.time_window.to_string(),
            limit: stat.filter.limit,
            total_rows: stat.total_rows,
            new_records: stat.new_records,
            error: stat.error.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default, JsonSchema)]
pub struct SlowOperationsReport {
    pub time_window: String,
    pub runtime_floor: f64,
    pub per_group_cap: usize,
    pub max_groups: usize,
    /// Distinct records collected before exclusion and ranking.
    pub records_scanned: usize,
    pub target_met: bool,
    pub groups: Vec<GroupSummary>,
    pub attempts: Vec<AttemptSummary>,
    pub degraded: Vec<DegradedFetch>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default, JsonSchema)]
pub struct DiagnosticReport {
    pub generated_at_unix_ms: u64,
    pub catalog: ExploreCatalog,
    pub slow_operations: SlowOperationsReport,
    pub dashboards: Vec<DashboardSummary>,
    pub saved_views: Vec<SavedViewSummary>,
    /// Every sub-fetch that produced no (or partial) data.
    pub degraded: Vec<DegradedFetch>,
    pub diagnostics: Vec<DiagnosticEntry>,
}

impl DiagnosticReport {
    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }
}
