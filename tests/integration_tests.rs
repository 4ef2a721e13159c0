//! Integration tests for runway
//!
//! These tests drive the `runway` binary against a temporary state root.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use tempfile::TempDir;

/// Helper to create a runway Command isolated from the caller's environment
fn runway(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("runway");
    cmd.current_dir(dir.path())
        .env_remove("RUNWAY_HOME")
        .env_remove("RUNWAY_ORG")
        .env_remove("RUNWAY_PROJECT")
        .env_remove("RUNWAY_AUTONOMY")
        .env_remove("RUNWAY_LOG")
        .arg("--home")
        .arg(dir.path().join("state"));
    cmd
}

/// Run a command with `--json` that must succeed and return its output
fn json(dir: &TempDir, args: &[&str]) -> Value {
    let output = runway(dir)
        .arg("--json")
        .args(args)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    serde_json::from_slice(&output).expect("stdout is not JSON")
}

/// Run a command with `--json` that must fail and return its error code
fn json_error(dir: &TempDir, args: &[&str]) -> String {
    let output = runway(dir)
        .arg("--json")
        .args(args)
        .assert()
        .failure()
        .get_output()
        .stdout
        .clone();
    let body: Value = serde_json::from_slice(&output).expect("stdout is not JSON");
    body["error"]["code"].as_str().unwrap_or_default().to_string()
}

fn start(dir: &TempDir, autonomy: &str) -> String {
    let run = json(dir, &["start", "--autonomy", autonomy]);
    run["run_id"].as_str().unwrap().to_string()
}

fn phase_record<'a>(run: &'a Value, phase: &str) -> &'a Value {
    run["phases"]
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["phase"] == phase)
        .unwrap()
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_runway_help() {
        cargo_bin_cmd!("runway").arg("--help").assert().success();
    }

    #[test]
    fn test_runway_version() {
        cargo_bin_cmd!("runway").arg("--version").assert().success();
    }

    #[test]
    fn test_workflows_lists_builtins() {
        let dir = TempDir::new().unwrap();
        runway(&dir)
            .arg("workflows")
            .assert()
            .success()
            .stdout(predicate::str::contains("sdlc"))
            .stdout(predicate::str::contains("hotfix"));
    }

    #[test]
    fn test_list_without_runs() {
        let dir = TempDir::new().unwrap();
        runway(&dir)
            .arg("list")
            .assert()
            .success()
            .stdout(predicate::str::contains("No runs found"));
    }
}

// =============================================================================
// Configuration Tests
// =============================================================================

mod configuration {
    use super::*;

    #[test]
    fn test_config_init_creates_file() {
        let dir = TempDir::new().unwrap();
        runway(&dir)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Created runway.toml"));
        assert!(dir.path().join("state/runway.toml").exists());

        runway(&dir)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));
    }

    #[test]
    fn test_config_validate_reports_warnings() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("state")).unwrap();
        fs::write(
            dir.path().join("state/runway.toml"),
            "[cleanup]\nmax_age_days = 0\n",
        )
        .unwrap();

        runway(&dir)
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("max_age_days is 0"));
    }

    #[test]
    fn test_configured_workflow_is_startable() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("state")).unwrap();
        fs::write(
            dir.path().join("state/runway.toml"),
            r#"
[defaults]
organization = "acme"
project = "billing"

[[workflows]]
id = "docs"
description = "Documentation only"
phases = ["frame", "build", "release"]
max_retries = 0
"#,
        )
        .unwrap();

        let run = json(&dir, &["start", "--workflow", "docs"]);
        assert!(run["run_id"].as_str().unwrap().starts_with("acme/billing/"));
        assert_eq!(run["phases"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_unknown_workflow_is_configuration_error() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            json_error(&dir, &["start", "--workflow", "nope"]),
            "configuration_error"
        );
    }
}

// =============================================================================
// Run Lifecycle Tests
// =============================================================================

mod lifecycle {
    use super::*;

    #[test]
    fn test_start_enters_first_phase() {
        let dir = TempDir::new().unwrap();
        let run = json(&dir, &["start", "--autonomy", "autonomous"]);
        assert_eq!(run["status"], "in_progress");
        assert_eq!(run["current_phase"], "frame");
        assert_eq!(run["workflow_id"], "sdlc");
    }

    #[test]
    fn test_autonomous_run_completes() {
        let dir = TempDir::new().unwrap();
        let run_id = start(&dir, "autonomous");

        let mut run = Value::Null;
        for _ in 0..5 {
            run = json(&dir, &["advance", &run_id]);
        }
        assert_eq!(run["status"], "completed");

        assert_eq!(json_error(&dir, &["advance", &run_id]), "invalid_state");
    }

    #[test]
    fn test_guarded_run_pauses_at_gate_until_resumed() {
        let dir = TempDir::new().unwrap();
        let run_id = start(&dir, "guarded");

        json(&dir, &["advance", &run_id]);
        let run = json(&dir, &["advance", &run_id]);
        assert_eq!(run["status"], "paused");
        assert_eq!(run["pending_gate"], "architect");

        let run = json(&dir, &["resume", &run_id]);
        assert_eq!(run["status"], "in_progress");
        assert_eq!(run["current_phase"], "build");
        assert!(run.get("pending_gate").is_none());
    }

    #[test]
    fn test_no_go_exhausts_retries() {
        let dir = TempDir::new().unwrap();
        let run_id = start(&dir, "autonomous");
        for _ in 0..3 {
            json(&dir, &["advance", &run_id]);
        }

        let run = json(&dir, &["advance", &run_id, "--outcome", "no-go"]);
        assert_eq!(run["current_phase"], "build");
        json(&dir, &["advance", &run_id]);
        let run = json(
            &dir,
            &["advance", &run_id, "--outcome", "no-go", "--reason", "tests fail"],
        );

        assert_eq!(run["status"], "failed");
        assert_eq!(phase_record(&run, "evaluate")["retry_count"], 2);
    }

    #[test]
    fn test_pause_is_idempotent_and_cancel_is_final() {
        let dir = TempDir::new().unwrap();
        let run_id = start(&dir, "autonomous");

        assert_eq!(json(&dir, &["pause", &run_id])["status"], "paused");
        assert_eq!(json(&dir, &["pause", &run_id])["status"], "paused");
        assert_eq!(json(&dir, &["cancel", &run_id])["status"], "cancelled");
        assert_eq!(json_error(&dir, &["resume", &run_id]), "invalid_state");
    }

    #[test]
    fn test_fail_then_recover_from_phase() {
        let dir = TempDir::new().unwrap();
        let run_id = start(&dir, "autonomous");
        json(&dir, &["advance", &run_id]);

        let run = json(&dir, &["fail", &run_id, "--message", "agent crashed"]);
        assert_eq!(run["status"], "failed");

        let run = json(
            &dir,
            &["recover", &run_id, "--from-phase", "evaluate", "--skip", "build"],
        );
        assert_eq!(run["status"], "in_progress");
        assert_eq!(run["current_phase"], "evaluate");
        assert_eq!(phase_record(&run, "build")["status"], "skipped");
        assert_eq!(phase_record(&run, "frame")["status"], "completed");
    }

    #[test]
    fn test_recover_requires_failed_or_paused() {
        let dir = TempDir::new().unwrap();
        let run_id = start(&dir, "autonomous");
        assert_eq!(
            json_error(&dir, &["recover", &run_id, "--from-phase", "frame"]),
            "invalid_state"
        );
    }

    #[test]
    fn test_unknown_run_is_not_found() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            json_error(
                &dir,
                &["status", "acme/billing/6f1c2a0e-3d43-4c4e-9a8b-2d7c1e5f9a10"]
            ),
            "not_found"
        );
        assert_eq!(json_error(&dir, &["status", "not-a-run-id"]), "validation_error");
    }
}

// =============================================================================
// Active Run Resolution Tests
// =============================================================================

mod active_run {
    use super::*;

    #[test]
    fn test_list_scopes_by_organization_and_project() {
        let dir = TempDir::new().unwrap();
        for (org, project) in [("acme", "billing"), ("acme", "web"), ("globex", "billing")] {
            json(&dir, &["--org", org, "--project", project, "start"]);
        }

        let runs = json(&dir, &["--org", "acme", "--project", "web", "list"]);
        assert_eq!(runs.as_array().unwrap().len(), 1);

        let runs = json(&dir, &["--org", "acme", "list"]);
        let listed = runs.as_array().unwrap();
        assert_eq!(listed.len(), 2);
        assert!(
            listed
                .iter()
                .all(|run| run["run_id"].as_str().unwrap().starts_with("acme/"))
        );

        let runs = json(&dir, &["list", "--all"]);
        assert_eq!(runs.as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_single_active_run_is_used() {
        let dir = TempDir::new().unwrap();
        let run_id = start(&dir, "autonomous");

        let run = json(&dir, &["pause"]);
        assert_eq!(run["run_id"], run_id.as_str());
        assert_eq!(run["status"], "paused");
    }

    #[test]
    fn test_no_active_run_is_an_error() {
        let dir = TempDir::new().unwrap();
        runway(&dir)
            .arg("status")
            .assert()
            .failure()
            .stderr(predicate::str::contains("No active runs"));
    }

    #[test]
    fn test_several_active_runs_need_an_id() {
        let dir = TempDir::new().unwrap();
        start(&dir, "autonomous");
        start(&dir, "autonomous");
        runway(&dir)
            .arg("status")
            .assert()
            .failure()
            .stderr(predicate::str::contains("2 active runs"));
    }
}

// =============================================================================
// Event Log Tests
// =============================================================================

mod events {
    use super::*;

    #[test]
    fn test_emit_without_type_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let run_id = start(&dir, "autonomous");
        let before = json(&dir, &["events", &run_id]).as_array().unwrap().len();

        assert_eq!(
            json_error(&dir, &["emit", &run_id, "--message", "no type"]),
            "validation_error"
        );
        let after = json(&dir, &["events", &run_id]).as_array().unwrap().len();
        assert_eq!(before, after);
    }

    #[test]
    fn test_emit_assigns_next_sequence() {
        let dir = TempDir::new().unwrap();
        let run_id = start(&dir, "autonomous");
        let events = json(&dir, &["events", &run_id]);
        let last = events.as_array().unwrap().last().unwrap()["sequence"]
            .as_u64()
            .unwrap();

        let event = json(
            &dir,
            &[
                "emit",
                &run_id,
                "--type",
                "step_completed",
                "--phase",
                "frame",
                "--meta",
                "tests=12",
            ],
        );
        assert_eq!(event["sequence"].as_u64().unwrap(), last + 1);
        assert_eq!(event["metadata"]["tests"], 12);

        let filtered = json(&dir, &["events", &run_id, "--type", "step_completed"]);
        assert_eq!(filtered.as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_consolidate_is_stable() {
        let dir = TempDir::new().unwrap();
        let run_id = start(&dir, "autonomous");

        let first = json(&dir, &["consolidate", &run_id]);
        let second = json(&dir, &["consolidate", &run_id]);
        assert_eq!(first["digest"], second["digest"]);
        assert_eq!(second["changed"], false);
        assert_eq!(first["events_consolidated"], second["events_consolidated"]);
    }
}

// =============================================================================
// Checkpoint Tests
// =============================================================================

mod checkpoints {
    use super::*;

    #[test]
    fn test_capture_then_recover_from_checkpoint() {
        let dir = TempDir::new().unwrap();
        let run_id = start(&dir, "autonomous");
        json(&dir, &["advance", &run_id]);

        let checkpoint = json(
            &dir,
            &["checkpoint", "capture", &run_id, "--step", "schema-drafted"],
        );
        let checkpoint_id = checkpoint["checkpoint_id"].as_str().unwrap().to_string();
        assert_eq!(checkpoint["phase"], "architect");

        let listed = json(&dir, &["checkpoint", "list", &run_id]);
        assert!(
            listed
                .as_array()
                .unwrap()
                .iter()
                .any(|c| c["checkpoint_id"] == checkpoint_id.as_str())
        );

        json(&dir, &["advance", &run_id]);
        json(&dir, &["fail", &run_id, "--message", "bad build"]);
        let run = json(&dir, &["recover", &run_id, "--checkpoint", &checkpoint_id]);
        assert_eq!(run["status"], "in_progress");
        assert_eq!(run["current_phase"], "architect");
    }

    #[test]
    fn test_show_unknown_checkpoint() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            json_error(&dir, &["checkpoint", "show", "cp_missing"]),
            "not_found"
        );
    }
}

// =============================================================================
// Drive Tests
// =============================================================================

mod drive {
    use super::*;

    #[test]
    fn test_drive_runs_to_completion() {
        let dir = TempDir::new().unwrap();
        let run_id = start(&dir, "autonomous");

        let run = json(&dir, &["drive", &run_id, "--command", "true"]);
        assert_eq!(run["status"], "completed");

        let agent_events = json(&dir, &["events", &run_id, "--type", "agent_completed"]);
        assert_eq!(agent_events.as_array().unwrap().len(), 5);
    }

    #[test]
    fn test_drive_maps_exit_two_to_no_go() {
        let dir = TempDir::new().unwrap();
        let run_id = start(&dir, "autonomous");

        let run = json(
            &dir,
            &[
                "drive",
                &run_id,
                "--command",
                r#"if [ "$RUNWAY_PHASE" = evaluate ]; then echo flaky >&2; exit 2; fi"#,
            ],
        );
        assert_eq!(run["status"], "failed");
        assert_eq!(phase_record(&run, "evaluate")["retry_count"], 2);
    }

    #[test]
    fn test_drive_exit_two_before_evaluate_fails_run() {
        let dir = TempDir::new().unwrap();
        let run_id = start(&dir, "autonomous");

        let run = json(&dir, &["drive", &run_id, "--command", "exit 2"]);
        assert_eq!(run["status"], "failed");
        assert_eq!(run["current_phase"], "frame");
        assert_eq!(phase_record(&run, "frame")["status"], "failed");
    }

    #[test]
    fn test_drive_without_command_fails() {
        let dir = TempDir::new().unwrap();
        let run_id = start(&dir, "autonomous");
        runway(&dir)
            .args(["drive", &run_id])
            .assert()
            .failure()
            .stderr(predicate::str::contains("No phase command configured"));
    }
}

// =============================================================================
// Cleanup Tests
// =============================================================================

mod cleanup {
    use super::*;

    #[test]
    fn test_dry_run_never_lists_active_runs() {
        let dir = TempDir::new().unwrap();
        start(&dir, "autonomous");

        let report = json(&dir, &["cleanup", "--max-age-days", "0", "--dry-run"]);
        assert!(report["candidates"].as_array().unwrap().is_empty());
        assert!(report["errors"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_cleanup_removes_finished_runs() {
        let dir = TempDir::new().unwrap();
        let run_id = start(&dir, "autonomous");
        json(&dir, &["cancel", &run_id]);
        std::thread::sleep(std::time::Duration::from_millis(20));

        let report = json(&dir, &["cleanup", "--max-age-days", "0"]);
        assert_eq!(report["deleted"][0], run_id.as_str());
        assert_eq!(json_error(&dir, &["status", &run_id]), "not_found");
    }

    #[test]
    fn test_out_of_range_age_cleans_nothing() {
        let dir = TempDir::new().unwrap();
        let run_id = start(&dir, "autonomous");
        json(&dir, &["cancel", &run_id]);

        let report = json(&dir, &["cleanup", "--max-age-days", "4000000000"]);
        assert!(report["deleted"].as_array().unwrap().is_empty());
        assert!(report["errors"].as_array().unwrap().is_empty());
        json(&dir, &["status", &run_id]);
    }
}

// =============================================================================
// Work Item Tests
// =============================================================================

mod work_items {
    use super::*;

    #[test]
    fn test_items_need_a_provider() {
        let dir = TempDir::new().unwrap();
        runway(&dir)
            .args(["item", "show", "WI-1"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("No work-item provider configured"));
    }

    #[test]
    fn test_local_items_enrich_runs() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("state")).unwrap();
        fs::write(
            dir.path().join("state/runway.toml"),
            "[provider]\nkind = \"local\"\n",
        )
        .unwrap();

        let item = json(&dir, &["item", "create", "Add invoices export"]);
        let item_id = item["id"].as_str().unwrap().to_string();

        let run = json(&dir, &["start", "--work-item", &item_id]);
        assert_eq!(run["metadata"]["work_item_title"], "Add invoices export");

        let listed = json(&dir, &["list", "--work-item", &item_id]);
        assert_eq!(listed.as_array().unwrap().len(), 1);
    }
}
