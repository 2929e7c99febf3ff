//! E2E ordering workflow: init, board, stage, tasks, then moves, bulk
//! reorder, archive/restore, reindex and delete through the `lanes` binary.
//!
//! Each test runs the binary as a subprocess in an isolated temp directory.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Test Harness
// ---------------------------------------------------------------------------

fn lanes_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("lanes"));
    cmd.current_dir(dir);
    cmd.env("LANES_USER", "1");
    cmd.env("LANES_LOG", "error");
    cmd.env_remove("FORMAT");
    cmd
}

fn init_project(dir: &Path) {
    lanes_cmd(dir).args(["init"]).assert().success();
}

/// Run a command with `--json`, assert success and parse stdout.
fn json(dir: &Path, args: &[&str]) -> Value {
    let output = lanes_cmd(dir)
        .args(args)
        .arg("--json")
        .output()
        .expect("command should not crash");
    assert!(
        output.status.success(),
        "{args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("valid JSON")
}

fn id_of(value: &Value) -> String {
    value["id"].as_i64().expect("id field").to_string()
}

/// Board with one stage holding tasks `titles`, in order.
fn seeded(dir: &Path, titles: &[&str]) -> (String, String, Vec<String>) {
    init_project(dir);
    let board = id_of(&json(dir, &["board", "create", "Roadmap"]));
    let stage = id_of(&json(dir, &["stage", &board, "Todo"]));
    let tasks = titles
        .iter()
        .map(|title| id_of(&json(dir, &["task", "create", &stage, title])))
        .collect();
    (board, stage, tasks)
}

/// Keys of the active items of `partition`, in rank order.
fn order(dir: &Path, partition: &str) -> Vec<String> {
    json(dir, &["list", partition])
        .as_array()
        .expect("list output is an array")
        .iter()
        .map(|item| item["key"].as_str().expect("key").to_string())
        .collect()
}

fn task_key(id: &str) -> String {
    format!("task:{id}")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn move_last_task_to_front() {
    let dir = TempDir::new().unwrap();
    let (_board, stage, tasks) = seeded(dir.path(), &["A", "B", "C"]);
    let lane = format!("stage:{stage}");

    let moved = json(
        dir.path(),
        &["move", &task_key(&tasks[2]), &lane, "--index", "1"],
    );
    assert_eq!(moved["item"]["position"], 32_768);
    assert_eq!(moved["renumbered"], false);

    assert_eq!(
        order(dir.path(), &lane),
        vec![task_key(&tasks[2]), task_key(&tasks[0]), task_key(&tasks[1])]
    );
}

#[test]
fn text_move_output_shows_fractional_position() {
    let dir = TempDir::new().unwrap();
    let (_board, stage, tasks) = seeded(dir.path(), &["A", "B", "C"]);

    lanes_cmd(dir.path())
        .args(["--format", "text", "move", &task_key(&tasks[2])])
        .arg(format!("stage:{stage}"))
        .args(["--index", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("at 0.5"));
}

#[test]
fn full_order_puts_listed_items_first() {
    let dir = TempDir::new().unwrap();
    let (_board, stage, tasks) = seeded(dir.path(), &["A", "B", "C"]);
    let lane = format!("stage:{stage}");

    json(
        dir.path(),
        &["order", &lane, &task_key(&tasks[2]), &task_key(&tasks[0])],
    );
    assert_eq!(
        order(dir.path(), &lane),
        vec![task_key(&tasks[2]), task_key(&tasks[0]), task_key(&tasks[1])]
    );
}

#[test]
fn archive_restore_roundtrip() {
    let dir = TempDir::new().unwrap();
    let (_board, stage, tasks) = seeded(dir.path(), &["A", "B", "C"]);
    let lane = format!("stage:{stage}");

    let archived = json(dir.path(), &["archive", &task_key(&tasks[0])]);
    assert_eq!(archived["position"], 0);
    assert!(archived["archived_at_us"].is_i64());
    assert_eq!(
        order(dir.path(), &lane),
        vec![task_key(&tasks[1]), task_key(&tasks[2])]
    );

    let all = json(dir.path(), &["list", &lane, "--archived"]);
    assert_eq!(all.as_array().map(Vec::len), Some(3));

    json(dir.path(), &["restore", &task_key(&tasks[0])]);
    assert_eq!(
        order(dir.path(), &lane),
        vec![task_key(&tasks[1]), task_key(&tasks[2]), task_key(&tasks[0])]
    );
}

#[test]
fn delete_then_reindex_compacts_positions() {
    let dir = TempDir::new().unwrap();
    let (_board, stage, tasks) = seeded(dir.path(), &["A", "B", "C"]);
    let lane = format!("stage:{stage}");

    json(dir.path(), &["delete", &task_key(&tasks[0])]);
    let result = json(dir.path(), &["reindex", &lane]);
    assert_eq!(result["changed"], 2);

    let positions: Vec<i64> = json(dir.path(), &["list", &lane])
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["position"].as_i64().unwrap())
        .collect();
    assert_eq!(positions, vec![65_536, 131_072]);
}

#[test]
fn stages_reorder_within_board() {
    let dir = TempDir::new().unwrap();
    init_project(dir.path());
    let board = id_of(&json(dir.path(), &["board", "create", "Roadmap"]));
    let todo = id_of(&json(dir.path(), &["stage", &board, "Todo"]));
    let done = id_of(&json(dir.path(), &["stage", &board, "Done"]));

    json(
        dir.path(),
        &["move", &format!("stage:{done}"), &format!("board:{board}"), "--index", "1"],
    );
    assert_eq!(
        order(dir.path(), &format!("board:{board}")),
        vec![format!("stage:{done}"), format!("stage:{todo}")]
    );
}

#[test]
fn archived_item_cannot_move() {
    let dir = TempDir::new().unwrap();
    let (_board, stage, tasks) = seeded(dir.path(), &["A", "B"]);
    json(dir.path(), &["archive", &task_key(&tasks[0])]);

    let output = lanes_cmd(dir.path())
        .args(["--json", "move", &task_key(&tasks[0])])
        .arg(format!("stage:{stage}"))
        .output()
        .unwrap();
    assert!(!output.status.success());
    let error: Value = serde_json::from_slice(&output.stderr).expect("JSON error on stderr");
    assert!(
        error["error"]["message"]
            .as_str()
            .unwrap()
            .contains("archived")
    );
    assert!(error["error"]["error_code"].is_string());
}

#[test]
fn missing_target_is_reported() {
    let dir = TempDir::new().unwrap();
    let (_board, _stage, tasks) = seeded(dir.path(), &["A"]);

    lanes_cmd(dir.path())
        .args(["--format", "text", "move", &task_key(&tasks[0]), "stage:999"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn commands_require_a_project() {
    let dir = TempDir::new().unwrap();
    lanes_cmd(dir.path())
        .args(["list", "board:1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("lanes init"));
}

#[test]
fn commands_require_a_user() {
    let dir = TempDir::new().unwrap();
    init_project(dir.path());
    lanes_cmd(dir.path())
        .env_remove("LANES_USER")
        .args(["board", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no acting user"));
}
