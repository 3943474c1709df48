use crate::config::{ConfigError, DiagConfig};
use crate::diagnostics::{unix_ms, DiagnosticLog};
use crate::listing::{parse_dashboards, parse_explores, parse_models, parse_saved_views};
use crate::report::{AttemptSummary, DiagnosticReport, ExploreCatalog, SlowOperationsReport};
use crate::runner::{run_all, FetchTask};
use serde_json::{json, Map, Value};
use slowscope_protocol::{DashboardSummary, DegradedFetch, ErrorInfo, ErrorKind, SavedViewSummary};
use slowscope_search::{
    group_and_rank, AdaptiveSearch, ExclusionRuleSet, QueryFilter, RelaxationLadder, TimeWindow,
};
use slowscope_transport::{CallError, RemoteCaller, SubprocessTransport};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

const TASK_MODELS: &str = "models";
const TASK_CATALOG: &str = "explores";
const TASK_SLOW_QUERIES: &str = "slow_queries";
const TASK_DASHBOARDS: &str = "dashboards";
const TASK_SAVED_VIEWS: &str = "saved_views";

/// Entry point for callers. Every operation returns a value; failures end up in the
/// `degraded` lists and in the shared [`DiagnosticLog`]. Clones share the caller and the log.
#[derive(Clone)]
pub struct Diagnostics {
    caller: Arc<dyn RemoteCaller>,
    config: Arc<DiagConfig>,
    rules: Arc<ExclusionRuleSet>,
    ladder: Arc<RelaxationLadder>,
    log: DiagnosticLog,
}

/// One section of [`DiagnosticReport`], so all sections can share a single `run_all`.
#[derive(Default)]
enum Section {
    #[default]
    Empty,
    Catalog(ExploreCatalog),
    SlowOperations(SlowOperationsReport),
    Dashboards(Vec<DashboardSummary>, Option<DegradedFetch>),
    SavedViews(Vec<SavedViewSummary>),
}

impl Diagnostics {
    /// Talk to the helper program described by `config`.
    pub fn new(config: DiagConfig) -> Result<Self, ConfigError> {
        let command = config.helper_command(|key| std::env::var(key).ok());
        Self::with_caller(config, Arc::new(SubprocessTransport::new(command)))
    }

    pub fn with_caller(
        config: DiagConfig,
        caller: Arc<dyn RemoteCaller>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let ladder = config.slow_queries.relaxation_ladder()?;
        Ok(Self {
            caller,
            rules: Arc::new(config.exclusion_rule_set()),
            ladder: Arc::new(ladder),
            config: Arc::new(config),
            log: DiagnosticLog::new(),
        })
    }

    pub fn config(&self) -> &DiagConfig {
        &self.config
    }

    pub fn log(&self) -> &DiagnosticLog {
        &self.log
    }

    pub async fn fetch_explore_catalog(&self) -> ExploreCatalog {
        let deadline = self.config.timeouts.catalog();
        match tokio::time::timeout(deadline, self.explore_catalog()).await {
            Ok(catalog) => catalog,
            Err(_) => ExploreCatalog {
                degraded: vec![self.deadline_exceeded(TASK_CATALOG, deadline)],
                ..ExploreCatalog::default()
            },
        }
    }

    pub async fn fetch_top_slow_operations(
        &self,
        time_range: TimeWindow,
        runtime_floor: f64,
        per_group_cap: usize,
        max_groups: usize,
    ) -> SlowOperationsReport {
        let deadline = self.config.timeouts.slow_queries();
        let work = self.slow_operations(time_range, runtime_floor, per_group_cap, max_groups);
        match tokio::time::timeout(deadline, work).await {
            Ok(report) => report,
            Err(_) => SlowOperationsReport {
                time_window: time_range.to_string(),
                runtime_floor,
                per_group_cap,
                max_groups,
                degraded: vec![self.deadline_exceeded(TASK_SLOW_QUERIES, deadline)],
                ..SlowOperationsReport::default()
            },
        }
    }

    /// Fetch every section concurrently with its own deadline. Sections that fail are empty
    /// and listed under `degraded`.
    pub async fn build_report(&self) -> DiagnosticReport {
        let timeouts = &self.config.timeouts;
        let slow = &self.config.slow_queries;

        let catalog = {
            let this = self.clone();
            FetchTask::new(TASK_CATALOG, timeouts.catalog(), async move {
                Ok(Section::Catalog(this.explore_catalog().await))
            })
        };
        let slow_operations = {
            let this = self.clone();
            let (window, floor, cap, groups) = (
                slow.time_window,
                slow.runtime_floor,
                slow.per_group_cap,
                slow.max_groups,
            );
            FetchTask::new(TASK_SLOW_QUERIES, timeouts.slow_queries(), async move {
                Ok(Section::SlowOperations(
                    this.slow_operations(window, floor, cap, groups).await,
                ))
            })
        };
        let dashboards = {
            let this = self.clone();
            FetchTask::new(TASK_DASHBOARDS, timeouts.listing(), async move {
                let (dashboards, degraded) = this.dashboards().await?;
                Ok(Section::Dashboards(dashboards, degraded))
            })
        };
        let saved_views = {
            let this = self.clone();
            FetchTask::new(TASK_SAVED_VIEWS, timeouts.listing(), async move {
                this.saved_views().await.map(Section::SavedViews)
            })
        };

        let outcomes = run_all(
            vec![catalog, slow_operations, dashboards, saved_views],
            &self.log,
        )
        .await;

        let mut report = DiagnosticReport {
            slow_operations: SlowOperationsReport {
                time_window: slow.time_window.to_string(),
                runtime_floor: slow.runtime_floor,
                per_group_cap: slow.per_group_cap,
                max_groups: slow.max_groups,
                ..SlowOperationsReport::default()
            },
            ..DiagnosticReport::default()
        };
        for (name, outcome) in outcomes {
            if let Some(error) = &outcome.error {
                report.degraded.push(DegradedFetch::new(name, error));
            }
            match outcome.value {
                Section::Empty => {}
                Section::Catalog(catalog) => {
                    report.degraded.extend(catalog.degraded.iter().cloned());
                    report.catalog = catalog;
                }
                Section::SlowOperations(slow_operations) => {
                    report.degraded.extend(slow_operations.degraded.iter().cloned());
                    report.slow_operations = slow_operations;
                }
                Section::Dashboards(dashboards, degraded) => {
                    report.degraded.extend(degraded);
                    report.dashboards = dashboards;
                }
                Section::SavedViews(saved_views) => report.saved_views = saved_views,
            }
        }
        report.diagnostics = self.log.snapshot();
        report.generated_at_unix_ms = unix_ms();
        if report.is_degraded() {
            log::warn!("report built with {} degraded fetch(es)", report.degraded.len());
        }
        report
    }

    async fn explore_catalog(&self) -> ExploreCatalog {
        let tools = &self.config.tools;
        let call_timeout = self.config.timeouts.call();
        let mut catalog = ExploreCatalog::default();

        let models = match self
            .caller
            .call(&tools.list_models, Map::new(), call_timeout)
            .await
        {
            Ok(result) => parse_models(&result),
            Err(err) => {
                catalog.degraded.push(self.degrade(TASK_MODELS, &err));
                return catalog;
            }
        };
        let (models, excluded): (Vec<_>, Vec<_>) = models
            .into_iter()
            .partition(|m| !self.rules.is_excluded(&m.model));
        if !excluded.is_empty() {
            log::debug!("skipping {} internal model(s)", excluded.len());
        }

        let tasks = models
            .iter()
            .map(|model| {
                let caller = Arc::clone(&self.caller);
                let tool = tools.list_explores.clone();
                let mut args = Map::new();
                args.insert("model".to_string(), Value::String(model.model.clone()));
                FetchTask::new(explores_task(&model.model), call_timeout, async move {
                    let result = caller.call(&tool, args, call_timeout).await?;
                    Ok(parse_explores(&result))
                })
            })
            .collect();
        let mut outcomes = run_all(tasks, &self.log).await;

        for mut model in models {
            let name = explores_task(&model.model);
            if let Some(outcome) = outcomes.remove(&name) {
                if let Some(error) = &outcome.error {
                    catalog.degraded.push(DegradedFetch::new(name, error));
                }
                model.explores = outcome.value;
            }
            catalog.models.push(model);
        }
        catalog
    }

    async fn slow_operations(
        &self,
        time_range: TimeWindow,
        runtime_floor: f64,
        per_group_cap: usize,
        max_groups: usize,
    ) -> SlowOperationsReport {
        let settings = &self.config.slow_queries;
        let mut report = SlowOperationsReport {
            time_window: time_range.to_string(),
            runtime_floor,
            per_group_cap,
            max_groups,
            ..SlowOperationsReport::default()
        };

        let base = match QueryFilter::new(time_range, runtime_floor, settings.row_limit) {
            Ok(base) => base,
            Err(err) => {
                let info = ErrorInfo::new(ErrorKind::Internal, err.to_string());
                self.log.record(TASK_SLOW_QUERIES, &info);
                report.degraded.push(DegradedFetch::new(TASK_SLOW_QUERIES, &info));
                return report;
            }
        };

        let search = AdaptiveSearch::new(
            Arc::clone(&self.caller),
            self.config.tools.query.clone(),
            settings.source.clone(),
            self.config.timeouts.call(),
        );
        let outcome = search
            .search_with_relaxation(&base, &self.ladder, settings.target_count)
            .await;

        report.attempts = outcome.attempts.iter().map(AttemptSummary::from).collect();
        for attempt in &outcome.attempts {
            if let Some(error) = &attempt.error {
                let task = format!("{TASK_SLOW_QUERIES}:{}", attempt.label);
                self.log.record(&task, error);
                report.degraded.push(DegradedFetch::new(task, error));
            }
        }
        report.target_met = outcome.target_met;
        report.records_scanned = outcome.records.len();
        report.groups = group_and_rank(outcome.records, &self.rules, per_group_cap, max_groups);
        report
    }

    /// Page through dashboards until a short page, a page that adds nothing, or the page cap.
    /// A failure after the first page keeps what was already fetched and is returned alongside.
    async fn dashboards(
        &self,
    ) -> Result<(Vec<DashboardSummary>, Option<DegradedFetch>), CallError> {
        let listing = &self.config.listing;
        let page_size = listing.dashboard_page_size;
        let mut seen = HashSet::new();
        let mut dashboards = Vec::new();
        let mut degraded = None;

        for page in 0..listing.max_dashboard_pages {
            let mut args = Map::new();
            args.insert("limit".to_string(), json!(page_size));
            args.insert("offset".to_string(), json!(page * page_size));

            let tool = &self.config.tools.list_dashboards;
            let result = match self.caller.call(tool, args, self.config.timeouts.call()).await {
                Ok(result) => result,
                Err(err) if page == 0 => return Err(err),
                Err(err) => {
                    degraded = Some(self.degrade(TASK_DASHBOARDS, &err));
                    break;
                }
            };

            let batch = parse_dashboards(&result);
            let fetched = batch.len();
            let before = dashboards.len();
            dashboards.extend(batch.into_iter().filter(|d| seen.insert(d.id.clone())));
            if fetched < page_size || dashboards.len() == before {
                break;
            }
        }
        log::debug!("listed {} dashboard(s)", dashboards.len());
        Ok((dashboards, degraded))
    }

    async fn saved_views(&self) -> Result<Vec<SavedViewSummary>, CallError> {
        let mut args = Map::new();
        args.insert("limit".to_string(), json!(self.config.listing.saved_view_limit));
        let result = self
            .caller
            .call(
                &self.config.tools.list_saved_views,
                args,
                self.config.timeouts.call(),
            )
            .await?;
        Ok(parse_saved_views(&result))
    }

    fn degrade(&self, task: &str, err: &CallError) -> DegradedFetch {
        let info = err.to_info();
        log::warn!("{task} failed: {err}");
        self.log.record(task, &info);
        DegradedFetch::new(task, &info)
    }

    fn deadline_exceeded(&self, task: &str, deadline: Duration) -> DegradedFetch {
        let info = ErrorInfo::new(
            ErrorKind::Timeout,
            format!("no result within {}ms", deadline.as_millis()),
        );
        log::warn!("{task}: {}", info.message);
        self.log.record(task, &info);
        DegradedFetch::new(task, &info)
    }
}

fn explores_task(model: &str) -> String {
    format!("{TASK_CATALOG}:{model}")
}

