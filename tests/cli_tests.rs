use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::{TempDir, tempdir};

fn write_workflow(dir: &TempDir, content: &str) -> PathBuf {
    let path = dir.path().join("Workflow.toml");
    fs::write(&path, content).expect("Failed to write workflow");
    path
}

fn matrix_ci(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("matrix-ci").unwrap();
    cmd.current_dir(dir).env("NO_COLOR", "1").args(["--lang", "en"]);
    cmd
}

const MATRIX: &str = r#"
name = "tests"
fail_fast = false

[matrix]
version = [3.7, 3.8]
os = ["linux", "mac"]

[[matrix.include]]
version = "3.x"
os = "linux"
profile = "lint"

[[steps]]
run = "echo ${{ matrix.version }}"
"#;

/// `plan` prints the expanded job list without running anything.
///
/// `plan` 打印展开后的作业列表，但不运行任何内容。
#[test]
fn test_plan_lists_expanded_jobs() {
    let dir = tempdir().unwrap();
    write_workflow(&dir, MATRIX);

    matrix_ci(dir.path())
        .arg("plan")
        .assert()
        .success()
        .stdout(predicate::str::contains("5 job(s)"))
        .stdout(predicate::str::contains("tests (3.7, linux)"))
        .stdout(predicate::str::contains("tests (3.x, linux, lint)"));
}

#[test]
fn test_plan_as_json() {
    let dir = tempdir().unwrap();
    write_workflow(&dir, MATRIX);

    let output = matrix_ci(dir.path())
        .args(["plan", "--json", "--total-runners", "2", "--runner-index", "1"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(plan["jobs"].as_array().unwrap().len(), 2);
    assert_eq!(plan["jobs"][0]["name"], "tests (3.7, mac)");
    assert_eq!(plan["cross_product_size"], 4);
    assert_eq!(plan["skipped_by_shard"], 3);
}

#[test]
fn test_invalid_matrix_is_rejected() {
    let dir = tempdir().unwrap();
    write_workflow(&dir, "[matrix]\nos = []\n[[steps]]\nrun = \"x\"\n");

    matrix_ci(dir.path())
        .arg("plan")
        .assert()
        .failure()
        .stderr(predicate::str::contains("matrix axis 'os'"));
}

#[test]
fn test_missing_workflow_file_fails() {
    let dir = tempdir().unwrap();

    matrix_ci(dir.path())
        .args(["run", "--config", "Nope.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Nope.toml"));
}

#[test]
fn test_init_writes_a_valid_workflow() {
    let dir = tempdir().unwrap();

    matrix_ci(dir.path())
        .args(["init", "--non-interactive"])
        .assert()
        .success();
    assert!(dir.path().join("Workflow.toml").exists());

    matrix_ci(dir.path())
        .arg("plan")
        .assert()
        .success()
        .stdout(predicate::str::contains("ci (local, stable)"))
        .stdout(predicate::str::contains("ci (local, nightly, true)"));

    // A second non-interactive init refuses to overwrite.
    matrix_ci(dir.path())
        .args(["init", "--non-interactive"])
        .assert()
        .failure();
}

#[cfg(unix)]
mod run_tests {
    use super::*;

    #[test]
    fn test_successful_run() {
        let dir = tempdir().unwrap();
        write_workflow(&dir, MATRIX);

        matrix_ci(dir.path())
            .args(["run", "--jobs", "2"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[ OK ] tests (3.8, mac)"))
            .stdout(predicate::str::contains("Run succeeded."));
    }

    /// A failing step fails the job, the run, and the process exit code.
    ///
    /// 失败的步骤会使作业、运行以及进程退出码失败。
    #[test]
    fn test_failing_step_fails_the_run() {
        let dir = tempdir().unwrap();
        write_workflow(
            &dir,
            r#"
name = "broken"
[[steps]]
name = "Fail"
run = "exit 3"
shell = "sh"
[[steps]]
name = "Never"
run = "echo never-printed"
"#,
        );

        matrix_ci(dir.path())
            .arg("run")
            .assert()
            .failure()
            .stdout(predicate::str::contains("[FAIL] broken"))
            .stdout(predicate::str::contains("Run failed."))
            .stdout(predicate::str::contains("never-printed").not())
            .stderr(predicate::str::contains("failed"));
    }

    #[test]
    fn test_event_filter_skips_the_run() {
        let dir = tempdir().unwrap();
        write_workflow(&dir, "on = [\"push\"]\n[[steps]]\nrun = \"false\"\n");

        matrix_ci(dir.path())
            .args(["run", "--event", "pull_request"])
            .assert()
            .success()
            .stdout(predicate::str::contains("does not run for 'pull_request'"));
    }

    #[test]
    fn test_reports_are_written() {
        let dir = tempdir().unwrap();
        write_workflow(&dir, MATRIX);
        let html = dir.path().join("report.html");
        let events = dir.path().join("events.jsonl");

        matrix_ci(dir.path())
            .arg("run")
            .arg("--html")
            .arg(&html)
            .arg("--events-log")
            .arg(&events)
            .assert()
            .success();

        assert!(fs::read_to_string(&html).unwrap().contains("tests (3.x, linux, lint)"));
        let lines = fs::read_to_string(&events).unwrap();
        assert_eq!(lines.lines().count(), 11);
        assert!(lines.lines().last().unwrap().contains("\"run_finished\""));
    }

    #[test]
    fn test_unknown_runner_selector_fails_the_job() {
        let dir = tempdir().unwrap();
        write_workflow(&dir, "runs_on = \"mainframe\"\n[[steps]]\nrun = \"true\"\n");

        matrix_ci(dir.path())
            .arg("run")
            .assert()
            .failure()
            .stdout(predicate::str::contains("no runner available for selector 'mainframe'"));
    }
}
