use anyhow::{Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use slowscope_orchestrator::{
    DiagConfig, DiagnosticReport, Diagnostics, ExploreCatalog, SlowOperationsReport,
};
use slowscope_protocol::{serialize_json, serialize_json_pretty};
use slowscope_search::TimeWindow;
use std::io;
use std::path::PathBuf;

fn print_stdout(text: &str) -> Result<()> {
    use std::io::Write;

    let mut stdout = io::stdout().lock();
    if let Err(err) = stdout
        .write_all(text.as_bytes())
        .and_then(|_| stdout.write_all(b"\n"))
        .and_then(|_| stdout.flush())
    {
        if err.kind() == io::ErrorKind::BrokenPipe {
            return Ok(());
        }
        return Err(err.into());
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let text = if pretty {
        serialize_json_pretty(value)?
    } else {
        serialize_json(value)?
    };
    print_stdout(&text)
}

#[derive(Parser)]
#[command(name = "slowscope")]
#[command(
    about = "Find the most expensive queries behind a BI backend through its MCP helper",
    long_about = None
)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for JSON)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// TOML configuration file
    #[arg(short, long, global = true, env = "SLOWSCOPE_CONFIG")]
    config: Option<PathBuf>,

    /// Helper program to launch (overrides config and SLOWSCOPE_HELPER)
    #[arg(long, global = true)]
    helper: Option<String>,

    /// Deadline of a single helper call in milliseconds
    #[arg(long, global = true)]
    call_timeout_ms: Option<u64>,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List models and their explores
    Catalog,

    /// Rank model/explore groups by total query runtime
    #[command(name = "slow-queries")]
    SlowQueries(SlowQueriesArgs),

    /// Fetch every section concurrently into one report
    Report,

    /// Print a JSON schema for command output
    Schema(SchemaArgs),

    /// Print the effective configuration
    #[command(name = "show-config")]
    ShowConfig,
}

#[derive(Args, Debug)]
struct SlowQueriesArgs {
    /// Look-back window, e.g. "7 days" or "24 hours"
    #[arg(long, value_parser = parse_time_window)]
    time_range: Option<TimeWindow>,

    /// Minimum runtime in seconds for the first search step
    #[arg(long)]
    runtime_floor: Option<f64>,

    /// Records kept per group
    #[arg(long)]
    per_group_cap: Option<usize>,

    /// Groups kept in the ranking
    #[arg(long)]
    max_groups: Option<usize>,
}

#[derive(Args, Debug)]
struct SchemaArgs {
    #[arg(value_enum, default_value = "report")]
    target: SchemaTarget,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SchemaTarget {
    Report,
    Catalog,
    SlowQueries,
}

impl SchemaTarget {
    fn schema(self) -> schemars::Schema {
        match self {
            Self::Report => schemars::schema_for!(DiagnosticReport),
            Self::Catalog => schemars::schema_for!(ExploreCatalog),
            Self::SlowQueries => schemars::schema_for!(SlowOperationsReport),
        }
    }
}

fn parse_time_window(raw: &str) -> std::result::Result<TimeWindow, String> {
    TimeWindow::parse(raw).map_err(|err| err.to_string())
}

fn init_logging(verbose: bool, quiet: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();
}

fn load_config(cli: &Cli) -> Result<DiagConfig> {
    load_config_with(cli, |key| std::env::var(key).ok())
}

/// Defaults, file and environment first; command-line flags win.
fn load_config_with(cli: &Cli, env: impl Fn(&str) -> Option<String>) -> Result<DiagConfig> {
    let mut config = DiagConfig::load_with(cli.config.as_deref(), env)
        .context("Failed to load configuration")?;
    if let Some(helper) = &cli.helper {
        config.helper.program = helper.clone();
    }
    if let Some(ms) = cli.call_timeout_ms {
        config.timeouts.call_ms = ms;
    }
    config.validate().context("Invalid command-line overrides")?;
    log::debug!("helper: {} {:?}", config.helper.program, config.helper.args);
    Ok(config)
}

pub async fn main_entry() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);
    run(cli).await
}

async fn run(cli: Cli) -> Result<()> {
    match &cli.command {
        Commands::Schema(args) => print_json(&args.target.schema(), cli.pretty),
        Commands::ShowConfig => print_json(&load_config(&cli)?, cli.pretty),
        Commands::Catalog => {
            let diagnostics = Diagnostics::new(load_config(&cli)?)?;
            let catalog = diagnostics.fetch_explore_catalog().await;
            log::info!(
                "catalog: {} model(s), {} degraded fetch(es)",
                catalog.models.len(),
                catalog.degraded.len()
            );
            print_json(&catalog, cli.pretty)
        }
        Commands::SlowQueries(args) => {
            let config = load_config(&cli)?;
            let slow = &config.slow_queries;
            let time_range = args.time_range.unwrap_or(slow.time_window);
            let runtime_floor = args.runtime_floor.unwrap_or(slow.runtime_floor);
            let per_group_cap = args.per_group_cap.unwrap_or(slow.per_group_cap);
            let max_groups = args.max_groups.unwrap_or(slow.max_groups);

            let diagnostics = Diagnostics::new(config)?;
            let report = diagnostics
                .fetch_top_slow_operations(time_range, runtime_floor, per_group_cap, max_groups)
                .await;
            log::info!(
                "slow queries: {} group(s) from {} record(s) in {} attempt(s)",
                report.groups.len(),
                report.records_scanned,
                report.attempts.len()
            );
            print_json(&report, cli.pretty)
        }
        Commands::Report => {
            let diagnostics = Diagnostics::new(load_config(&cli)?)?;
            let report = diagnostics.build_report().await;
            log::info!(
                "report: {} slow group(s), {} dashboard(s), {} degraded fetch(es)",
                report.slow_operations.groups.len(),
                report.dashboards.len(),
                report.degraded.len()
            );
            print_json(&report, cli.pretty)
        }
    }
}
