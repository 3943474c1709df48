use crate::error::{Result, SearchError};
use crate::filter::{validate_floor, QueryFilter, QuerySource};
use crate::records::extract_records;
use crate::window::TimeWindow;
use serde::{Deserialize, Serialize};
use slowscope_protocol::{ErrorInfo, QueryRecord};
use slowscope_transport::RemoteCaller;
use std::collections::HashSet;
use std::time::Duration;

pub const BASE_STEP_LABEL: &str = "base";
pub const FILL_IN_STEP_LABEL: &str = "fill-in";

/// One relaxation: every set field loosens the running filter. A step can never tighten it:
/// floors only go down, windows only grow, limits only rise.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LadderStep {
    pub label: String,
    #[serde(default)]
    pub runtime_floor: Option<f64>,
    #[serde(default)]
    pub time_window: Option<TimeWindow>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl LadderStep {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            runtime_floor: None,
            time_window: None,
            limit: None,
        }
    }

    pub fn floor(mut self, runtime_floor: f64) -> Self {
        self.runtime_floor = Some(runtime_floor);
        self
    }

    pub fn window(mut self, time_window: TimeWindow) -> Self {
        self.time_window = Some(time_window);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn apply(&self, current: &QueryFilter) -> QueryFilter {
        let mut next = current.clone();
        if let Some(floor) = self.runtime_floor {
            next.runtime_floor = next.runtime_floor.min(floor);
        }
        if let Some(window) = self.time_window {
            next.time_window = next.time_window.max(window);
        }
        if let Some(limit) = self.limit {
            next.limit = next.limit.max(limit);
        }
        next
    }

    fn validate(&self) -> Result<()> {
        if self.runtime_floor.is_none() && self.time_window.is_none() && self.limit.is_none() {
            return Err(SearchError::EmptyStep(self.label.clone()));
        }
        if let Some(floor) = self.runtime_floor {
            validate_floor(floor)?;
        }
        Ok(())
    }
}

/// Ordered relaxations, most selective first.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RelaxationLadder {
    steps: Vec<LadderStep>,
}

impl RelaxationLadder {
    pub fn new(steps: Vec<LadderStep>) -> Result<Self> {
        for step in &steps {
            step.validate()?;
        }
        Ok(Self { steps })
    }

    /// Append the low-confidence fill-in step as the final, least selective entry.
    pub fn with_fill_in(mut self, runtime_floor: Option<f64>) -> Result<Self> {
        if let Some(floor) = runtime_floor {
            let step = LadderStep::new(FILL_IN_STEP_LABEL).floor(floor);
            step.validate()?;
            self.steps.push(step);
        }
        Ok(self)
    }

    pub fn steps(&self) -> &[LadderStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttemptStat {
    pub label: String,
    pub filter: QueryFilter,
    pub total_rows: usize,
    pub new_records: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub records: Vec<QueryRecord>,
    pub attempts: Vec<AttemptStat>,
    pub target_count: usize,
    pub target_met: bool,
}

/// Runs the structured-query tool against a [`QuerySource`], relaxing the filter step by step
/// until enough distinct records are found.
pub struct AdaptiveSearch<C> {
    caller: C,
    tool_name: String,
    source: QuerySource,
    call_timeout: Duration,
}

impl<C: RemoteCaller> AdaptiveSearch<C> {
    pub fn new(
        caller: C,
        tool_name: impl Into<String>,
        source: QuerySource,
        call_timeout: Duration,
    ) -> Self {
        Self {
            caller,
            tool_name: tool_name.into(),
            source,
            call_timeout,
        }
    }

    /// Stops when `target_count` distinct records are collected, when the ladder runs out, or
    /// when a successful step adds nothing new after something was already found. Failed steps
    /// count as zero new records and the search moves on.
    pub async fn search_with_relaxation(
        &self,
        base: &QueryFilter,
        ladder: &RelaxationLadder,
        target_count: usize,
    ) -> SearchOutcome {
        let mut outcome = SearchOutcome {
            target_count,
            ..SearchOutcome::default()
        };
        let mut seen: HashSet<String> = HashSet::new();
        let mut filter = base.clone();
        let mut previous: Option<QueryFilter> = None;

        let steps = std::iter::once((BASE_STEP_LABEL, None)).chain(
            ladder
                .steps()
                .iter()
                .map(|step| (step.label.as_str(), Some(step))),
        );

        for (label, step) in steps {
            if let Some(step) = step {
                filter = step.apply(&filter);
            }
            if previous.as_ref() == Some(&filter) {
                log::debug!("ladder step '{label}' does not relax the filter; skipped");
                continue;
            }
            previous = Some(filter.clone());

            let args = self.source.arguments(&filter);
            log::debug!(
                "ladder step '{label}': floor={}s window={} limit={}",
                filter.runtime_floor,
                filter.time_window,
                filter.limit
            );

            let result = match self.caller.call(&self.tool_name, args, self.call_timeout).await {
                Ok(result) => result,
                Err(err) => {
                    log::warn!("ladder step '{label}' failed: {err}");
                    outcome.attempts.push(AttemptStat {
                        label: label.to_string(),
                        filter: filter.clone(),
                        total_rows: 0,
                        new_records: 0,
                        error: Some(err.to_info()),
                    });
                    continue;
                }
            };

            let rows = extract_records(&result, &self.source.fields);
            let total_rows = rows.len();
            let mut new_records = 0usize;
            for mut record in rows {
                if seen.insert(record.id.clone()) {
                    record.category = Some(label.to_string());
                    outcome.records.push(record);
                    new_records += 1;
                }
            }
            outcome.attempts.push(AttemptStat {
                label: label.to_string(),
                filter: filter.clone(),
                total_rows,
                new_records,
                error: None,
            });

            if outcome.records.len() >= target_count {
                outcome.target_met = true;
                break;
            }
            if new_records == 0 && !outcome.records.is_empty() {
                log::debug!("ladder step '{label}' added nothing new; stopping");
                break;
            }
        }

        log::debug!(
            "adaptive search collected {} record(s) in {} attempt(s)",
            outcome.records.len(),
            outcome.attempts.len()
        );
        outcome
    }
}
