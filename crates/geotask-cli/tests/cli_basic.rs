//! Basic CLI E2E tests.
//!
//! Tests invoke the built binary with HOME pointed at a temporary directory
//! and verify its JSON output.

use std::path::Path;
use std::process::Command;

use serde_json::Value;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(home: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_geotask"))
        .args(args)
        .env("HOME", home)
        .env_remove("GEOTASK_ENV")
        .env("GEOTASK_LOG", "off")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

fn run_json(home: &Path, args: &[&str]) -> Value {
    let (stdout, stderr, code) = run_cli(home, args);
    assert_eq!(code, 0, "{args:?} failed: {stderr}");
    serde_json::from_str(&stdout).expect("stdout is JSON")
}

fn add_task(home: &Path, name: &str, priority: &str, region: &str) -> i64 {
    let task = run_json(
        home,
        &["task", "add", name, "--priority", priority, "--region", region],
    );
    task["id"].as_i64().expect("task id")
}

#[test]
fn test_task_add_and_list() {
    let home = tempfile::tempdir().unwrap();
    let id = add_task(home.path(), "Groceries", "4", "market");

    let list = run_json(home.path(), &["task", "list"]);
    let tasks = list.as_array().unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0]["task"]["id"].as_i64(), Some(id));
    assert_eq!(tasks[0]["state"], "idle");
}

#[test]
fn test_start_pause_stop_records_history() {
    let home = tempfile::tempdir().unwrap();
    let id = add_task(home.path(), "Report", "3", "office");
    let id_arg = id.to_string();

    let started = run_json(home.path(), &["start", &id_arg]);
    assert_eq!(started["started"], true);
    assert_eq!(started["state"], "active");

    let status = run_json(home.path(), &["status"]);
    assert_eq!(status["active"]["task"]["id"].as_i64(), Some(id));

    let paused = run_json(home.path(), &["pause"]);
    assert_eq!(paused["active"]["running"], false);

    let stopped = run_json(home.path(), &["stop"]);
    assert_eq!(stopped["history"]["task_id"].as_i64(), Some(id));

    let history = run_json(home.path(), &["history", "--task", &id_arg]);
    assert_eq!(history.as_array().unwrap().len(), 1);
    let status = run_json(home.path(), &["status"]);
    assert!(status["active"].is_null());
}

#[test]
fn test_lower_priority_start_is_deferred() {
    let home = tempfile::tempdir().unwrap();
    let high = add_task(home.path(), "Urgent", "5", "office");
    let low = add_task(home.path(), "Someday", "1", "office");

    run_json(home.path(), &["start", &high.to_string()]);
    let deferred = run_json(home.path(), &["start", &low.to_string()]);
    assert_eq!(deferred["started"], false);
    assert_eq!(deferred["state"], "pending");
}

#[test]
fn test_notification_trigger() {
    let home = tempfile::tempdir().unwrap();
    let id = add_task(home.path(), "Pick up parcel", "3", "post-office");

    let result = run_json(
        home.path(),
        &["trigger", r#"{"notificationId": 7, "geofenceIds": ["post-office"]}"#],
    );
    assert_eq!(result["outcomes"][0]["task_id"].as_i64(), Some(id));
    assert_eq!(result["outcomes"][0]["started"], true);

    let (_, _, code) = run_cli(home.path(), &["trigger", r#"{"geofenceIds": []}"#]);
    assert_ne!(code, 0);
}

#[test]
fn test_switch_resolve_requires_an_answer() {
    let home = tempfile::tempdir().unwrap();
    let (_, _, code) = run_cli(home.path(), &["switch", "resolve", "1"]);
    assert_ne!(code, 0);
    let (_, _, code) = run_cli(home.path(), &["switch", "resolve", "1", "--start"]);
    assert_ne!(code, 0, "unknown switch ids are rejected");
}

#[test]
fn test_config_set_and_get() {
    let home = tempfile::tempdir().unwrap();
    let (stdout, _, code) = run_cli(home.path(), &["config", "set", "scheduler.default_snooze_secs", "300"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "ok");

    let (stdout, _, code) = run_cli(home.path(), &["config", "get", "scheduler.default_snooze_secs"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "300");

    let (_, _, code) = run_cli(home.path(), &["config", "set", "scheduler.nope", "1"]);
    assert_ne!(code, 0);

    let (stdout, _, _) = run_cli(home.path(), &["config", "path"]);
    assert!(stdout.contains("geotask"));
}
