use serde::{Deserialize, Serialize};
use slowscope_search::{
    ExclusionRuleSet, ExclusionRules, LadderStep, QueryFilter, QuerySource, RelaxationLadder,
    SearchError, TimeWindow,
};
use slowscope_transport::{HelperCommand, DEFAULT_UNSUPPORTED_MARKERS};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const ENV_HELPER: &str = "SLOWSCOPE_HELPER";
pub const ENV_CALL_TIMEOUT_MS: &str = "SLOWSCOPE_CALL_TIMEOUT_MS";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Invalid slow-query settings: {0}")]
    Search(#[from] SearchError),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiagConfig {
    pub helper: HelperConfig,
    pub tools: ToolNames,
    pub timeouts: Timeouts,
    pub slow_queries: SlowQueryConfig,
    /// Built-in internal-entity rules unless the file has its own `[exclusions]` table.
    pub exclusions: ExclusionRules,
    pub listing: ListingConfig,
}

impl Default for DiagConfig {
    fn default() -> Self {
        Self {
            helper: HelperConfig::default(),
            tools: ToolNames::default(),
            timeouts: Timeouts::default(),
            slow_queries: SlowQueryConfig::default(),
            exclusions: ExclusionRules::builtin(),
            listing: ListingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HelperConfig {
    pub program: String,
    pub args: Vec<String>,
    /// Extra environment for the helper, e.g. credentials.
    pub env: BTreeMap<String, String>,
    /// Variables copied from this process's environment when set.
    pub env_passthrough: Vec<String>,
    pub unsupported_markers: Vec<String>,
}

impl Default for HelperConfig {
    fn default() -> Self {
        Self {
            program: "toolbox".to_string(),
            args: vec![
                "--stdio".to_string(),
                "--prebuilt".to_string(),
                "looker".to_string(),
            ],
            env: BTreeMap::new(),
            env_passthrough: [
                "LOOKER_BASE_URL",
                "LOOKER_CLIENT_ID",
                "LOOKER_CLIENT_SECRET",
                "LOOKER_VERIFY_SSL",
            ]
            .iter()
            .map(|v| (*v).to_string())
            .collect(),
            unsupported_markers: DEFAULT_UNSUPPORTED_MARKERS
                .iter()
                .map(|m| (*m).to_string())
                .collect(),
        }
    }
}

/// Concrete tool names behind each remote capability.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ToolNames {
    pub list_models: String,
    pub list_explores: String,
    pub query: String,
    pub list_dashboards: String,
    pub list_saved_views: String,
}

impl Default for ToolNames {
    fn default() -> Self {
        Self {
            list_models: "get_models".to_string(),
            list_explores: "get_explores".to_string(),
            query: "query".to_string(),
            list_dashboards: "get_dashboards".to_string(),
            list_saved_views: "get_looks".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Timeouts {
    /// Deadline of a single helper call.
    pub call_ms: u64,
    pub catalog_ms: u64,
    pub slow_queries_ms: u64,
    pub listing_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            call_ms: 30_000,
            catalog_ms: 120_000,
            slow_queries_ms: 180_000,
            listing_ms: 60_000,
        }
    }
}

impl Timeouts {
    pub fn call(&self) -> Duration {
        Duration::from_millis(self.call_ms)
    }

    pub fn catalog(&self) -> Duration {
        Duration::from_millis(self.catalog_ms)
    }

    pub fn slow_queries(&self) -> Duration {
        Duration::from_millis(self.slow_queries_ms)
    }

    pub fn listing(&self) -> Duration {
        Duration::from_millis(self.listing_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SlowQueryConfig {
    pub source: QuerySource,
    pub time_window: TimeWindow,
    pub runtime_floor: f64,
    pub row_limit: usize,
    pub target_count: usize,
    pub per_group_cap: usize,
    pub max_groups: usize,
    pub ladder: Vec<LadderStep>,
    /// Floor of the final low-confidence step; `None` disables it.
    pub fill_in_runtime_floor: Option<f64>,
}

impl Default for SlowQueryConfig {
    fn default() -> Self {
        Self {
            source: QuerySource::default(),
            time_window: TimeWindow::days(7),
            runtime_floor: 5.0,
            row_limit: 500,
            target_count: 50,
            per_group_cap: 5,
            max_groups: 10,
            ladder: vec![
                LadderStep::new("floor-2s").floor(2.0),
                LadderStep::new("window-30d").window(TimeWindow::days(30)),
            ],
            fill_in_runtime_floor: Some(1.0),
        }
    }
}

impl SlowQueryConfig {
    pub fn base_filter(&self) -> Result<QueryFilter> {
        Ok(QueryFilter::new(
            self.time_window,
            self.runtime_floor,
            self.row_limit,
        )?)
    }

    pub fn relaxation_ladder(&self) -> Result<RelaxationLadder> {
        Ok(RelaxationLadder::new(self.ladder.clone())?.with_fill_in(self.fill_in_runtime_floor)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ListingConfig {
    pub dashboard_page_size: usize,
    pub max_dashboard_pages: usize,
    pub saved_view_limit: usize,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            dashboard_page_size: 100,
            max_dashboard_pages: 10,
            saved_view_limit: 200,
        }
    }
}

impl DiagConfig {
    /// Defaults, then the TOML file (if any), then environment overrides; validated.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// [`DiagConfig::load`] with the environment read through `lookup`.
    pub fn load_with(
        path: Option<&Path>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let mut cfg = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        cfg.apply_env_overrides(lookup)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml_str(raw: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(program) = lookup(ENV_HELPER).filter(|v| !v.trim().is_empty()) {
            self.helper.program = program.trim().to_string();
        }
        if let Some(raw) = lookup(ENV_CALL_TIMEOUT_MS) {
            self.timeouts.call_ms = raw.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("{ENV_CALL_TIMEOUT_MS}={raw} is not a number"))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.helper.program.trim().is_empty() {
            return Err(ConfigError::Invalid("helper.program is empty".to_string()));
        }
        let timeouts = [
            ("timeouts.call_ms", self.timeouts.call_ms),
            ("timeouts.catalog_ms", self.timeouts.catalog_ms),
            ("timeouts.slow_queries_ms", self.timeouts.slow_queries_ms),
            ("timeouts.listing_ms", self.timeouts.listing_ms),
        ];
        for (name, value) in timeouts {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be > 0")));
            }
        }
        let sq = &self.slow_queries;
        for (name, value) in [
            ("slow_queries.per_group_cap", sq.per_group_cap),
            ("slow_queries.max_groups", sq.max_groups),
            ("slow_queries.target_count", sq.target_count),
            ("listing.dashboard_page_size", self.listing.dashboard_page_size),
            ("listing.max_dashboard_pages", self.listing.max_dashboard_pages),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be > 0")));
            }
        }
        sq.base_filter()?;
        sq.relaxation_ladder()?;
        Ok(())
    }

    /// Helper launch command with pass-through variables resolved from `lookup`.
    pub fn helper_command(&self, lookup: impl Fn(&str) -> Option<String>) -> HelperCommand {
        let mut env = BTreeMap::new();
        for key in &self.helper.env_passthrough {
            if let Some(value) = lookup(key) {
                env.insert(key.clone(), value);
            }
        }
        env.extend(self.helper.env.clone());

        let mut command = HelperCommand::new(self.helper.program.clone())
            .with_args(self.helper.args.iter().cloned());
        command.env = env;
        command.unsupported_markers = self.helper.unsupported_markers.clone();
        command
    }

    pub fn exclusion_rule_set(&self) -> ExclusionRuleSet {
        ExclusionRuleSet::new(&self.exclusions)
    }
}
