//! Integration tests for the `batchview` CLI binary.
//!
//! Every test serves resources from a temporary JSON fixture, so nothing
//! depends on the user's configuration or environment.
#![allow(clippy::unwrap_used)]

use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tempfile::TempDir;

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `batchview` binary with env isolation.
///
/// Clears all `BATCHVIEW_*` env vars and points config directories at a
/// nonexistent path so tests never touch the user's real configuration.
fn batchview_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("batchview");
    cmd.env("HOME", "/tmp/batchview-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/batchview-cli-test-nonexistent")
        .env_remove("BATCHVIEW_CONFIG")
        .env_remove("BATCHVIEW_FIXTURE")
        .env_remove("BATCHVIEW_OUTPUT")
        .env_remove("BATCHVIEW_ENGINE__SORT_AUTO_UPDATE_LIMIT")
        .env_remove("BATCHVIEW_ENGINE__PAGE_SIZE")
        .env_remove("BATCHVIEW_DEFAULTS__OUTPUT")
        .env_remove("RUST_LOG");
    cmd
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

fn stdout_lines(output: &std::process::Output) -> Vec<String> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::to_owned)
        .collect()
}

fn pool_id(n: usize) -> String {
    format!("pool-{n:02}")
}

fn target_nodes(n: usize) -> usize {
    (n * 7) % 11
}

/// 30 pools (every fifth resizing), three jobs, tasks for `job-a`, two
/// certificates, and the files of one node.
fn fixture_json() -> Value {
    let pools: Vec<Value> = (0..30)
        .map(|n| {
            json!({
                "id": pool_id(n),
                "vmSize": "standard_d2_v3",
                "state": if n % 5 == 0 { "resizing" } else { "active" },
                "allocationState": "steady",
                "currentDedicatedNodes": target_nodes(n),
                "targetDedicatedNodes": target_nodes(n),
                "creationTime": "2024-05-01T08:00:00Z",
            })
        })
        .collect();
    json!({
        "pools": pools,
        "jobs": [
            {"id": "job-a", "state": "active", "priority": 10, "poolInfo": {"poolId": "pool-00"}},
            {"id": "job-b", "state": "completed", "priority": 50, "poolInfo": {"poolId": "pool-01"}},
            {"id": "job-c", "state": "active", "priority": -5},
        ],
        "tasks": {
            "job-a": [
                {"id": "render-1", "state": "completed", "commandLine": "render --frame 1", "executionInfo": {"exitCode": 0}},
                {"id": "render-2", "state": "completed", "commandLine": "render --frame 2", "executionInfo": {"exitCode": 3}},
                {"id": "render-3", "state": "running", "commandLine": "render --frame 3"},
            ],
        },
        "certificates": [
            {"thumbprint": "AB12", "thumbprintAlgorithm": "sha1", "state": "active"},
            {"thumbprint": "CD34", "thumbprintAlgorithm": "sha256", "state": "deleting"},
        ],
        "nodeFiles": {
            "pool-00/tvm-1": [
                {"name": "stdout.txt", "isDirectory": false, "properties": {"contentLength": 1024}},
                {"name": "stderr.txt", "isDirectory": false, "properties": {"contentLength": 12}},
                {"name": "wd", "isDirectory": true},
            ],
        },
    })
}

struct Workspace {
    dir: TempDir,
    fixture: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let fixture = dir.path().join("fixture.json");
        std::fs::write(&fixture, fixture_json().to_string()).unwrap();
        Self { dir, fixture }
    }

    fn config_path(&self) -> PathBuf {
        self.dir.path().join("config.toml")
    }

    fn write_config(&self, contents: &str) -> PathBuf {
        let path = self.config_path();
        std::fs::write(&path, contents).unwrap();
        path
    }

    /// Command with the fixture and an isolated config path.
    fn cmd(&self) -> assert_cmd::Command {
        let mut cmd = batchview_cmd();
        cmd.arg("--fixture")
            .arg(&self.fixture)
            .arg("--config")
            .arg(self.config_path());
        cmd
    }
}

fn json_output(output: &std::process::Output) -> Value {
    assert!(
        output.status.success(),
        "command failed:\n{}",
        combined_output(output)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap()
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = batchview_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    batchview_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("batch resources")
            .and(predicate::str::contains("list"))
            .and(predicate::str::contains("get"))
            .and(predicate::str::contains("config")),
    );
}

#[test]
fn test_version_flag() {
    batchview_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("batchview"));
}

#[test]
fn test_completions_bash() {
    batchview_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_invalid_kind() {
    let output = batchview_cmd().args(["list", "clusters"]).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("invalid value"));
}

#[test]
fn test_list_without_fixture() {
    let output = batchview_cmd()
        .args(["--config", "/tmp/batchview-cli-test-nonexistent/config.toml"])
        .args(["list", "pools"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(combined_output(&output).contains("No fixture configured"));
}

#[test]
fn test_missing_fixture_file() {
    let ws = Workspace::new();
    let output = batchview_cmd()
        .args(["--fixture", path_str(&ws.dir.path().join("absent.json"))])
        .args(["list", "pools"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(combined_output(&output).contains("Could not load fixture"));
}

// ── Paging ──────────────────────────────────────────────────────────

#[test]
fn test_list_loads_one_page_by_default() {
    let ws = Workspace::new();
    let output = ws
        .cmd()
        .args(["list", "pools", "--page-size", "10", "-o", "plain"])
        .output()
        .unwrap();

    assert!(output.status.success());
    assert_eq!(stdout_lines(&output), (0..10).map(pool_id).collect::<Vec<_>>());
    assert!(String::from_utf8_lossy(&output.stderr).contains("More pools available"));
}

#[test]
fn test_list_pages_flag_loads_more() {
    let ws = Workspace::new();
    let output = ws
        .cmd()
        .args(["list", "pools", "--page-size", "10", "--pages", "2", "-o", "plain"])
        .output()
        .unwrap();

    assert_eq!(stdout_lines(&output), (0..20).map(pool_id).collect::<Vec<_>>());
}

#[test]
fn test_list_all_loads_every_page() {
    let ws = Workspace::new();
    let output = ws
        .cmd()
        .args(["list", "pools", "--all", "--page-size", "7", "-o", "plain"])
        .output()
        .unwrap();

    assert!(output.status.success());
    assert_eq!(stdout_lines(&output).len(), 30);
    assert!(!String::from_utf8_lossy(&output.stderr).contains("More pools"));
}

#[test]
fn test_page_size_from_config() {
    let ws = Workspace::new();
    ws.write_config("[engine]\npage_size = 4\n");
    let output = ws.cmd().args(["list", "pools", "-o", "plain"]).output().unwrap();

    assert_eq!(stdout_lines(&output), (0..4).map(pool_id).collect::<Vec<_>>());
}

#[test]
fn test_limit_truncates_output() {
    let ws = Workspace::new();
    let output = ws
        .cmd()
        .args(["list", "pools", "--all", "--limit", "3", "-o", "plain"])
        .output()
        .unwrap();

    assert_eq!(stdout_lines(&output), vec![pool_id(0), pool_id(1), pool_id(2)]);
}

// ── Filtering and sorting ───────────────────────────────────────────

#[test]
fn test_filter_is_applied_by_the_backend() {
    let ws = Workspace::new();
    let output = ws
        .cmd()
        .args(["list", "pools", "--all", "--filter", "state=resizing", "-o", "plain"])
        .output()
        .unwrap();

    let expected: Vec<String> = (0..30).step_by(5).map(pool_id).collect();
    assert_eq!(stdout_lines(&output), expected);
}

#[test]
fn test_malformed_filter_is_an_api_error() {
    let ws = Workspace::new();
    let output = ws
        .cmd()
        .args(["list", "pools", "--filter", "resizing"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(combined_output(&output).contains("expected field=value"));
}

#[test]
fn test_sort_all_descending() {
    let ws = Workspace::new();
    let output = ws
        .cmd()
        .args([
            "list",
            "pools",
            "--all",
            "--sort",
            "targetDedicatedNodes",
            "--desc",
            "-o",
            "json",
        ])
        .output()
        .unwrap();

    let pools = json_output(&output);
    let nodes: Vec<u64> = pools
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["targetDedicatedNodes"].as_u64().unwrap())
        .collect();
    assert_eq!(nodes.len(), 30);
    assert!(nodes.windows(2).all(|w| w[0] >= w[1]), "not descending: {nodes:?}");
    assert_eq!(nodes[0], 10);
}

#[test]
fn test_unknown_sort_key() {
    let ws = Workspace::new();
    let output = ws
        .cmd()
        .args(["list", "jobs", "--sort", "color"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
    let text = combined_output(&output);
    assert!(text.contains("unknown sort key 'color'"), "{text}");
    assert!(text.contains("priority"), "{text}");
}

#[test]
fn test_large_lists_warn_about_partial_sorting() {
    let ws = Workspace::new();
    let output = ws
        .cmd()
        .env("BATCHVIEW_ENGINE__SORT_AUTO_UPDATE_LIMIT", "5")
        .args(["list", "pools", "--page-size", "10", "--sort", "id", "--desc", "-o", "plain"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let ids = stdout_lines(&output);
    assert_eq!(ids.first(), Some(&pool_id(9)));
    assert!(
        String::from_utf8_lossy(&output.stderr)
            .contains("only the 10 loaded pools are sorted"),
        "{}",
        combined_output(&output)
    );
}

#[test]
fn test_all_makes_large_sorts_authoritative() {
    let ws = Workspace::new();
    let output = ws
        .cmd()
        .env("BATCHVIEW_ENGINE__SORT_AUTO_UPDATE_LIMIT", "5")
        .args(["list", "pools", "--page-size", "10", "--all", "--sort", "id", "--desc", "-o", "plain"])
        .output()
        .unwrap();

    let ids = stdout_lines(&output);
    assert_eq!(ids.first(), Some(&pool_id(29)));
    assert_eq!(ids.len(), 30);
    assert!(!String::from_utf8_lossy(&output.stderr).contains("only the"));
}

// ── Scoped resources ────────────────────────────────────────────────

#[test]
fn test_tasks_require_a_job() {
    let ws = Workspace::new();
    let output = ws.cmd().args(["list", "tasks"]).output().unwrap();

    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("--job"));
}

#[test]
fn test_list_tasks_of_a_job() {
    let ws = Workspace::new();
    let output = ws
        .cmd()
        .args(["list", "tasks", "--job", "job-a", "--sort", "exitCode", "-o", "plain"])
        .output()
        .unwrap();

    assert!(output.status.success());
    // Tasks without an exit code sort first.
    insta::assert_snapshot!(String::from_utf8_lossy(&output.stdout).trim_end(), @r"
    render-3
    render-1
    render-2
    ");
}

#[test]
fn test_tasks_of_unknown_job() {
    let ws = Workspace::new();
    let output = ws
        .cmd()
        .args(["list", "tasks", "--job", "job-z"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(4));
    assert!(combined_output(&output).contains("job 'job-z' not found"));
}

#[test]
fn test_list_node_files() {
    let ws = Workspace::new();
    let output = ws
        .cmd()
        .args(["list", "node-files", "--pool", "pool-00", "--node", "tvm-1", "--sort", "name"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Name") && stdout.contains("Size"));
    assert!(stdout.contains("wd/"));
    let stderr_pos = stdout.find("stderr.txt").unwrap();
    let stdout_pos = stdout.find("stdout.txt").unwrap();
    assert!(stderr_pos < stdout_pos);
}

// ── Get ─────────────────────────────────────────────────────────────

#[test]
fn test_get_pool_as_json() {
    let ws = Workspace::new();
    let output = ws
        .cmd()
        .args(["get", "pools", "pool-07", "-o", "json"])
        .output()
        .unwrap();

    let pool = json_output(&output);
    assert_eq!(pool["id"], "pool-07");
    assert_eq!(pool["allocationState"], "steady");
}

#[test]
fn test_get_pool_detail_table() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["get", "pool", "pool-07"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("pool-07")
                .and(predicate::str::contains("VM Size"))
                .and(predicate::str::contains("standard_d2_v3")),
        );
}

#[test]
fn test_get_missing_pool() {
    let ws = Workspace::new();
    let output = ws.cmd().args(["get", "pools", "pool-99"]).output().unwrap();

    assert_eq!(output.status.code(), Some(4));
    let text = combined_output(&output);
    assert!(text.contains("pool 'pool-99' not found"), "{text}");
    assert!(text.contains("batchview list pools"), "{text}");
}

#[test]
fn test_get_certificate_uses_the_default_algorithm() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["get", "certificates", "AB12", "-o", "plain"])
        .assert()
        .success()
        .stdout("AB12\n");

    let output = ws.cmd().args(["get", "certificates", "CD34"]).output().unwrap();
    assert_eq!(output.status.code(), Some(4));

    ws.cmd()
        .args(["get", "certificates", "CD34", "--algorithm", "sha256", "-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"deleting\""));
}

#[test]
fn test_get_task_in_unknown_job() {
    let ws = Workspace::new();
    let output = ws
        .cmd()
        .args(["get", "tasks", "render-1", "--job", "job-z"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(4));
    assert!(combined_output(&output).contains("job 'job-z' not found"));
}

// ── Output formats ──────────────────────────────────────────────────

#[test]
fn test_json_compact_is_one_line() {
    let ws = Workspace::new();
    let output = ws.cmd().args(["list", "jobs", "-o", "json-compact"]).output().unwrap();

    assert_eq!(stdout_lines(&output).len(), 1);
    assert_eq!(json_output(&output).as_array().unwrap().len(), 3);
}

#[test]
fn test_yaml_output() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["list", "jobs", "-o", "yaml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("id: job-a").and(predicate::str::contains("poolId: pool-01")));
}

#[test]
fn test_default_output_from_config() {
    let ws = Workspace::new();
    ws.write_config("[defaults]\noutput = \"plain\"\n");
    let output = ws.cmd().args(["list", "jobs"]).output().unwrap();

    assert_eq!(stdout_lines(&output), vec!["job-a", "job-b", "job-c"]);
}

#[test]
fn test_invalid_output_in_config() {
    let ws = Workspace::new();
    ws.write_config("[defaults]\noutput = \"xml\"\n");
    let output = ws.cmd().args(["list", "jobs"]).output().unwrap();

    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("defaults.output"));
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_path_honors_flag() {
    let ws = Workspace::new();
    let path = ws.config_path();
    batchview_cmd()
        .args(["config", "path", "--config", path_str(&path)])
        .assert()
        .success()
        .stdout(predicate::str::contains(path_str(&path)));
}

#[test]
fn test_config_init_records_the_fixture() {
    let ws = Workspace::new();
    let path = ws.config_path();

    batchview_cmd()
        .args(["--config", path_str(&path)])
        .args(["config", "init", "--with-fixture", path_str(&ws.fixture)])
        .assert()
        .success();
    assert!(path.exists());

    // The recorded fixture is used without --fixture.
    let output = batchview_cmd()
        .args(["--config", path_str(&path), "list", "jobs", "-o", "plain"])
        .output()
        .unwrap();
    assert_eq!(stdout_lines(&output), vec!["job-a", "job-b", "job-c"]);

    // A second init needs --force.
    let output = batchview_cmd()
        .args(["--config", path_str(&path), "config", "init"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("--force"));

    batchview_cmd()
        .args(["--config", path_str(&path), "config", "init", "--force"])
        .assert()
        .success();
}

#[test]
fn test_config_show_as_json() {
    let ws = Workspace::new();
    ws.write_config("[engine]\nsort_auto_update_limit = 500\n");
    let output = batchview_cmd()
        .args(["--config", path_str(&ws.config_path()), "config", "show", "-o", "json"])
        .output()
        .unwrap();

    let config = json_output(&output);
    assert_eq!(config["engine"]["sort_auto_update_limit"], 500);
    assert_eq!(config["engine"]["ignored_error_codes"], json!([404]));
    assert_eq!(config["defaults"]["output"], "table");
}

#[test]
fn test_config_show_as_toml() {
    let ws = Workspace::new();
    batchview_cmd()
        .args(["--config", path_str(&ws.config_path()), "config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[engine]").and(predicate::str::contains("sort_auto_update_limit = 20000")));
}
