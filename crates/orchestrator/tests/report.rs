use anyhow::Result;
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::{json, Map, Value};
use slowscope_orchestrator::{ConfigError, DiagConfig, Diagnostics, Timeouts};
use slowscope_protocol::{Envelope, ErrorKind, Payload, RemoteCallResult};
use slowscope_search::TimeWindow;
use slowscope_transport::{CallError, RemoteCaller};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

enum Reply {
    Json(Value),
    Fail(&'static str),
    Hang,
}

type Handler = Box<dyn Fn(&str, &Map<String, Value>) -> Reply + Send + Sync>;

/// In-memory helper answering by tool name.
struct FakeHelper {
    handler: Handler,
    calls: Mutex<Vec<(String, Map<String, Value>)>>,
}

impl FakeHelper {
    fn new<F>(handler: F) -> Arc<Self>
    where
        F: Fn(&str, &Map<String, Value>) -> Reply + Send + Sync + 'static,
    {
        Arc::new(Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls_to(&self, tool: &str) -> Vec<Map<String, Value>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == tool)
            .map(|(_, args)| args.clone())
            .collect()
    }
}

#[async_trait]
impl RemoteCaller for FakeHelper {
    async fn call(
        &self,
        tool_name: &str,
        arguments: Map<String, Value>,
        timeout: Duration,
    ) -> slowscope_transport::Result<RemoteCallResult> {
        let reply = (self.handler)(tool_name, &arguments);
        self.calls
            .lock()
            .unwrap()
            .push((tool_name.to_string(), arguments));
        match reply {
            Reply::Json(value) => Ok(RemoteCallResult {
                envelopes: vec![Envelope {
                    id: Some(7),
                    payloads: vec![Payload::Json(value)],
                }],
                skipped_lines: 0,
            }),
            Reply::Fail(message) => Err(CallError::RemoteError {
                tool: tool_name.to_string(),
                code: None,
                message: message.to_string(),
            }),
            Reply::Hang => {
                tokio::time::sleep(timeout).await;
                Err(CallError::Timeout {
                    tool: tool_name.to_string(),
                    after: timeout,
                })
            }
        }
    }
}

fn row(id: &str, model: &str, explore: &str, runtime: f64) -> Value {
    json!({
        "history.id": id,
        "query.model": model,
        "query.view": explore,
        "history.runtime": runtime,
    })
}

/// Twelve records across four groups totalling 40s, 25s, 10s and 3s, plus one internal record.
fn history() -> Value {
    json!([
        row("o1", "ecommerce", "orders", 20.0),
        row("o2", "ecommerce", "orders", 8.0),
        row("o3", "ecommerce", "orders", 7.0),
        row("o4", "ecommerce", "orders", 5.0),
        row("u1", "ecommerce", "users", 6.0),
        row("u2", "ecommerce", "users", 12.0),
        row("u3", "ecommerce", "users", 7.0),
        row("e1", "web", "events", 5.0),
        row("e2", "web", "events", 5.0),
        row("s1", "web", "sessions", 1.0),
        row("s2", "web", "sessions", 1.0),
        row("s3", "web", "sessions", 1.0),
        row("x1", "system__activity", "history", 90.0),
    ])
}

fn config() -> DiagConfig {
    let mut cfg = DiagConfig::default();
    cfg.timeouts = Timeouts {
        call_ms: 200,
        catalog_ms: 1_000,
        slow_queries_ms: 2_000,
        listing_ms: 1_000,
    };
    cfg.slow_queries.max_groups = 2;
    cfg.listing.dashboard_page_size = 2;
    cfg
}

fn healthy(tool: &str, args: &Map<String, Value>) -> Reply {
    match tool {
        "get_models" => Reply::Json(json!([
            {"name": "ecommerce", "label": "E-commerce"},
            {"name": "system__activity"},
            {"name": "finance"}
        ])),
        "get_explores" => match args["model"].as_str() {
            Some("ecommerce") => Reply::Json(json!([{"name": "orders"}, {"name": "users"}])),
            _ => Reply::Fail("model not found"),
        },
        "query" => Reply::Json(history()),
        "get_dashboards" => match args["offset"].as_u64() {
            Some(0) => Reply::Json(json!([
                {"id": 1, "title": "Revenue"},
                {"id": 2, "title": "Ops"}
            ])),
            _ => Reply::Json(json!([{"id": 3, "title": "Growth"}])),
        },
        "get_looks" => Reply::Json(json!([
            {"id": 9, "title": "Top customers", "model": "ecommerce"}
        ])),
        _ => Reply::Fail("unexpected tool"),
    }
}

#[tokio::test]
async fn report_collects_every_section_and_lists_partial_failures() {
    let helper = FakeHelper::new(healthy);
    let diagnostics = Diagnostics::with_caller(config(), helper.clone()).unwrap();

    let report = diagnostics.build_report().await;

    let models: Vec<&str> = report
        .catalog
        .models
        .iter()
        .map(|m| m.model.as_str())
        .collect();
    assert_eq!(models, vec!["ecommerce", "finance"]);
    assert_eq!(report.catalog.models[0].explores.len(), 2);
    assert!(report.catalog.models[1].explores.is_empty());

    let keys: Vec<&str> = report
        .slow_operations
        .groups
        .iter()
        .map(|g| g.key.as_str())
        .collect();
    assert_eq!(keys, vec!["ecommerce.orders", "ecommerce.users"]);
    assert_eq!(report.slow_operations.records_scanned, 13);
    // Base step finds everything, the next step adds nothing and the ladder stops.
    assert_eq!(report.slow_operations.attempts.len(), 2);

    assert_eq!(report.dashboards.len(), 3);
    assert_eq!(helper.calls_to("get_dashboards").len(), 2);
    assert_eq!(report.saved_views[0].model.as_deref(), Some("ecommerce"));

    assert_eq!(report.degraded.len(), 1);
    assert_eq!(report.degraded[0].task, "explores:finance");
    assert_eq!(report.degraded[0].kind, ErrorKind::RemoteError);
    assert_eq!(report.diagnostics.len(), 1);
    assert!(report.generated_at_unix_ms > 0);
}

#[tokio::test]
async fn total_failure_still_yields_a_valid_empty_report() -> Result<()> {
    let helper = FakeHelper::new(|_, _| Reply::Fail("helper misconfigured"));
    let diagnostics = Diagnostics::with_caller(config(), helper).unwrap();

    let report = diagnostics.build_report().await;

    assert!(report.catalog.models.is_empty());
    assert!(report.slow_operations.groups.is_empty());
    assert!(report.dashboards.is_empty());
    assert!(report.saved_views.is_empty());

    let mut tasks: Vec<&str> = report.degraded.iter().map(|d| d.task.as_str()).collect();
    tasks.sort_unstable();
    assert_eq!(
        tasks,
        vec![
            "dashboards",
            "models",
            "saved_views",
            "slow_queries:base",
            "slow_queries:fill-in",
            "slow_queries:floor-2s",
            "slow_queries:window-30d",
        ]
    );
    assert!(report
        .degraded
        .iter()
        .all(|d| d.kind == ErrorKind::RemoteError));

    let value = serde_json::to_value(&report)?;
    for key in ["catalog", "slow_operations", "dashboards", "saved_views", "degraded"] {
        assert!(value.get(key).is_some(), "missing {key}");
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn hanging_section_times_out_alone() {
    let helper = FakeHelper::new(|tool, args| match tool {
        "get_dashboards" => Reply::Hang,
        _ => healthy(tool, args),
    });
    let diagnostics = Diagnostics::with_caller(config(), helper).unwrap();

    let report = diagnostics.build_report().await;

    assert!(report.dashboards.is_empty());
    assert_eq!(report.saved_views.len(), 1);
    assert_eq!(report.slow_operations.groups.len(), 2);
    let dashboards = report
        .degraded
        .iter()
        .find(|d| d.task == "dashboards")
        .expect("dashboards degraded");
    assert_eq!(dashboards.kind, ErrorKind::Timeout);
}

#[tokio::test]
async fn slow_operations_rank_top_groups() {
    let helper = FakeHelper::new(healthy);
    let diagnostics = Diagnostics::with_caller(config(), helper.clone()).unwrap();

    let report = diagnostics
        .fetch_top_slow_operations(TimeWindow::days(7), 5.0, 5, 2)
        .await;

    assert!(report.degraded.is_empty());
    assert_eq!(report.groups.len(), 2);
    assert_eq!(report.groups[0].total_cost, 40.0);
    assert_eq!(report.groups[1].total_cost, 25.0);
    let total: usize = report.groups.iter().map(|g| g.records.len()).sum();
    assert!(total <= 10);
    assert!(report
        .groups
        .iter()
        .flat_map(|g| &g.records)
        .all(|r| r.group_key != "web.sessions" && r.model != "system__activity"));

    let first = &helper.calls_to("query")[0];
    assert_eq!(first["filters"]["history.runtime"], ">= 5");
    assert_eq!(first["filters"]["history.created_date"], "7 days");
    assert_eq!(report.attempts[0].label, "base");
}

#[tokio::test]
async fn invalid_floor_degrades_instead_of_failing() {
    let helper = FakeHelper::new(healthy);
    let diagnostics = Diagnostics::with_caller(config(), helper.clone()).unwrap();

    let report = diagnostics
        .fetch_top_slow_operations(TimeWindow::days(7), -3.0, 5, 2)
        .await;

    assert!(report.groups.is_empty());
    assert_eq!(report.degraded[0].kind, ErrorKind::Internal);
    assert!(helper.calls_to("query").is_empty());
}

#[tokio::test]
async fn catalog_without_models_listing_is_degraded() {
    let helper = FakeHelper::new(|tool, args| match tool {
        "get_models" => Reply::Fail("permission denied"),
        _ => healthy(tool, args),
    });
    let diagnostics = Diagnostics::with_caller(config(), helper.clone()).unwrap();

    let catalog = diagnostics.fetch_explore_catalog().await;

    assert!(catalog.models.is_empty());
    assert_eq!(catalog.degraded[0].task, "models");
    assert!(helper.calls_to("get_explores").is_empty());
    assert_eq!(diagnostics.log().len(), 1);
}

#[tokio::test]
async fn dashboards_stop_when_a_page_repeats() {
    let helper = FakeHelper::new(|tool, args| match tool {
        "get_dashboards" => Reply::Json(json!([
            {"id": 1, "title": "A"},
            {"id": 2, "title": "B"}
        ])),
        _ => healthy(tool, args),
    });
    let diagnostics = Diagnostics::with_caller(config(), helper.clone()).unwrap();

    let report = diagnostics.build_report().await;

    assert_eq!(report.dashboards.len(), 2);
    let offsets: Vec<u64> = helper
        .calls_to("get_dashboards")
        .iter()
        .filter_map(|args| args["offset"].as_u64())
        .collect();
    assert_eq!(offsets, vec![0, 2]);
}

/// A full page of two dashboards whose ids follow the requested offset.
fn dashboard_page(args: &Map<String, Value>) -> Value {
    let offset = args["offset"].as_u64().unwrap_or(0);
    json!([
        {"id": offset + 1, "title": format!("Board {}", offset + 1)},
        {"id": offset + 2, "title": format!("Board {}", offset + 2)}
    ])
}

#[tokio::test]
async fn dashboards_stop_at_the_page_cap() {
    let helper = FakeHelper::new(|tool, args| match tool {
        "get_dashboards" => Reply::Json(dashboard_page(args)),
        _ => healthy(tool, args),
    });
    let mut cfg = config();
    cfg.listing.max_dashboard_pages = 3;
    let diagnostics = Diagnostics::with_caller(cfg, helper.clone()).unwrap();

    let report = diagnostics.build_report().await;

    assert_eq!(helper.calls_to("get_dashboards").len(), 3);
    assert_eq!(report.dashboards.len(), 6);
    assert!(report.degraded.iter().all(|d| d.task != "dashboards"));
}

#[tokio::test]
async fn failed_later_page_keeps_earlier_dashboards_and_is_degraded() {
    let helper = FakeHelper::new(|tool, args| match tool {
        "get_dashboards" => match args["offset"].as_u64() {
            Some(0) => Reply::Json(dashboard_page(args)),
            _ => Reply::Fail("rate limited"),
        },
        _ => healthy(tool, args),
    });
    let diagnostics = Diagnostics::with_caller(config(), helper.clone()).unwrap();

    let report = diagnostics.build_report().await;

    let ids: Vec<&str> = report.dashboards.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2"]);
    assert_eq!(helper.calls_to("get_dashboards").len(), 2);
    let dashboards = report
        .degraded
        .iter()
        .find(|d| d.task == "dashboards")
        .expect("dashboards degraded");
    assert_eq!(dashboards.kind, ErrorKind::RemoteError);
    assert!(report.diagnostics.iter().any(|e| e.task == "dashboards"));
}

/// Helper whose explore listings never answer and count how many are still running.
struct StuckExplores {
    in_flight: Arc<AtomicUsize>,
}

struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RemoteCaller for StuckExplores {
    async fn call(
        &self,
        tool_name: &str,
        arguments: Map<String, Value>,
        timeout: Duration,
    ) -> slowscope_transport::Result<RemoteCallResult> {
        if tool_name != "get_explores" {
            return FakeHelper::new(healthy)
                .call(tool_name, arguments, timeout)
                .await;
        }
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let _guard = InFlight(Arc::clone(&self.in_flight));
        tokio::time::sleep(timeout).await;
        Err(CallError::Timeout {
            tool: tool_name.to_string(),
            after: timeout,
        })
    }
}

#[tokio::test(start_paused = true)]
async fn catalog_deadline_cancels_explore_calls() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let helper = Arc::new(StuckExplores {
        in_flight: Arc::clone(&in_flight),
    });
    let mut cfg = config();
    cfg.timeouts.call_ms = 5_000;
    cfg.timeouts.catalog_ms = 100;
    let diagnostics = Diagnostics::with_caller(cfg, helper).unwrap();

    let catalog = diagnostics.fetch_explore_catalog().await;

    assert!(catalog.models.is_empty());
    assert_eq!(catalog.degraded.len(), 1);
    assert_eq!(catalog.degraded[0].task, "explores");
    assert_eq!(catalog.degraded[0].kind, ErrorKind::Timeout);

    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(in_flight.load(Ordering::SeqCst), 0);
}

#[test]
fn invalid_config_is_rejected() {
    let mut cfg = config();
    cfg.timeouts.call_ms = 0;
    let helper = FakeHelper::new(healthy);
    let err = Diagnostics::with_caller(cfg, helper).err().expect("rejected");
    assert!(matches!(err, ConfigError::Invalid(_)));
}
