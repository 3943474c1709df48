use assert_cmd::prelude::*;
use pretty_assertions::assert_eq;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

#[allow(deprecated)]
fn slowscope() -> Command {
    let mut cmd = Command::cargo_bin("slowscope").expect("binary");
    cmd.env_remove("SLOWSCOPE_HELPER")
        .env_remove("SLOWSCOPE_CALL_TIMEOUT_MS")
        .env_remove("SLOWSCOPE_CONFIG");
    cmd
}

/// Stub helper: answers model and explore listings, rejects every other tool.
const STUB_HELPER: &str = r##"req=$(cat)
id=$(printf '%s' "$req" | sed -n 's/.*"id":\([0-9]*\).*/\1/p')
case "$req" in
  *'"name":"get_models"'*) text='[{\"name\":\"ecommerce\"},{\"name\":\"system__activity\"}]' ;;
  *'"name":"get_explores"'*) text='[{\"name\":\"orders\"}]' ;;
  *)
    printf '{"jsonrpc":"2.0","id":%s,"error":{"code":-32000,"message":"not available"}}\n' "$id"
    exit 0
    ;;
esac
printf '{"jsonrpc":"2.0","id":%s,"result":{"content":[{"type":"text","text":"%s"}]}}\n' "$id" "$text"
"##;

fn write_config(dir: &TempDir) -> PathBuf {
    let script = dir.path().join("helper.sh");
    std::fs::write(&script, STUB_HELPER).unwrap();
    let config = dir.path().join("slowscope.toml");
    std::fs::write(
        &config,
        format!(
            r#"[helper]
program = "/bin/sh"
args = ["{}"]
env_passthrough = []

[timeouts]
call_ms = 10000
"#,
            script.display()
        ),
    )
    .unwrap();
    config
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("valid json on stdout")
}

#[cfg(unix)]
#[test]
fn catalog_lists_models_through_stub_helper() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);

    let output = slowscope()
        .args(["--quiet", "catalog", "--config"])
        .arg(&config)
        .output()
        .expect("run");

    assert!(output.status.success());
    let body = stdout_json(&output);
    let models = body["models"].as_array().expect("models");
    assert_eq!(models.len(), 1);
    assert_eq!(models[0]["model"], "ecommerce");
    assert_eq!(models[0]["explores"][0]["name"], "orders");
    assert_eq!(body["degraded"], Value::Array(Vec::new()));
}

#[cfg(unix)]
#[test]
fn report_is_valid_json_when_sections_fail() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);

    let output = slowscope()
        .args(["--quiet", "report", "--config"])
        .arg(&config)
        .output()
        .expect("run");

    assert!(output.status.success());
    let body = stdout_json(&output);
    assert_eq!(body["catalog"]["models"][0]["model"], "ecommerce");
    assert!(body["slow_operations"]["groups"]
        .as_array()
        .expect("groups")
        .is_empty());
    let degraded: Vec<&str> = body["degraded"]
        .as_array()
        .expect("degraded")
        .iter()
        .filter_map(|d| d["task"].as_str())
        .collect();
    assert!(degraded.contains(&"dashboards"));
    assert!(degraded.contains(&"saved_views"));
    assert!(degraded.contains(&"slow_queries:base"));
}

#[test]
fn schema_needs_no_helper() {
    let output = slowscope()
        .args(["schema", "slow-queries"])
        .output()
        .expect("run");

    assert!(output.status.success());
    let schema = stdout_json(&output);
    assert!(schema["properties"].get("groups").is_some());
}

#[test]
fn invalid_time_range_is_rejected() {
    slowscope()
        .args(["slow-queries", "--time-range", "whenever"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("Invalid time window"));
}

#[test]
fn missing_config_file_fails_loudly() {
    slowscope()
        .args(["show-config", "--config"])
        .arg(Path::new("/nonexistent/slowscope.toml"))
        .assert()
        .failure()
        .stderr(predicates::str::contains("Failed to load configuration"));
}
