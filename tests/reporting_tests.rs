//! # Reporting Tests / 报告测试
//!
//! Tests for the JSON Lines event log, the HTML report, and localized
//! status strings.
//!
//! 测试 JSON Lines 事件日志、HTML 报告和本地化状态字符串。

mod common;

use common::{FakeProvider, ScriptedStepRunner, workflow};
use matrix_ci::core::coordinator::{RunCoordinator, RunRecord};
use matrix_ci::core::job::JobStatus;
use matrix_ci::core::trigger::TriggerContext;
use matrix_ci::reporting::console::status_str;
use matrix_ci::reporting::html::render_html_report;
use matrix_ci::reporting::{JsonLinesSink, generate_html_report};
use serde_json::Value;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use tempfile::tempdir;

const WORKFLOW: &str = r#"
name = "report"
fail_fast = false
[matrix]
os = ["linux", "mac"]
[[steps]]
name = "Test on ${{ matrix.os }}"
run = "test-${{ matrix.os }}"
"#;

/// A `Write` handle onto a buffer the test can read back.
#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SharedBuffer {
    fn lines(&self) -> Vec<Value> {
        let bytes = self.0.lock().unwrap().clone();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }
}

async fn run_with_failure(buffer: Option<SharedBuffer>) -> RunRecord {
    let runner = Arc::new(ScriptedStepRunner::new().exit("test-mac", 4));
    let mut coordinator = RunCoordinator::new(Arc::new(FakeProvider::new()), runner);
    if let Some(buffer) = buffer {
        coordinator = coordinator.with_sink(Arc::new(JsonLinesSink::from_writer(buffer)));
    }
    coordinator
        .run(TriggerContext::manual("acme/widgets"), &workflow(WORKFLOW))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_events_log_has_one_object_per_line() {
    let buffer = SharedBuffer::default();
    let record = run_with_failure(Some(buffer.clone())).await;

    let lines = buffer.lines();
    // Two transitions per job, then the run record.
    assert_eq!(lines.len(), 5);
    assert!(lines[..4].iter().all(|l| l["type"] == "job_transition"));

    let last = &lines[4];
    assert_eq!(last["type"], "run_finished");
    assert_eq!(last["status"], "failed");
    assert_eq!(last["run_id"], record.run_id().to_string());
    assert_eq!(last["trigger"]["event"], "manual");
    assert_eq!(last["jobs"][1]["status"], "failed");
    assert_eq!(last["jobs"][1]["steps"][0]["exit_code"], 4);

    let failed = lines
        .iter()
        .find(|l| l["type"] == "job_transition" && l["to"] == "failed")
        .unwrap();
    assert_eq!(failed["job_name"], "report (mac)");
    assert_eq!(failed["from"], "running");
}

#[tokio::test]
async fn test_html_report_lists_every_job() {
    let record = run_with_failure(None).await;

    let html = render_html_report(&record, "en").into_string();
    assert!(html.starts_with("<!DOCTYPE html>"));
    assert!(html.contains("report (linux)"));
    assert!(html.contains("report (mac)"));
    assert!(html.contains("status-failed"));
    assert!(html.contains("exited with status 4"));

    let dir = tempdir().unwrap();
    let path = dir.path().join("report.html");
    generate_html_report(&record, &path, "en").unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), html);
}

#[tokio::test]
async fn test_html_report_escapes_output() {
    let wf = workflow("[[steps]]\nname = \"<script>\"\nrun = \"x\"\n");
    let record = RunCoordinator::new(
        Arc::new(FakeProvider::new()),
        Arc::new(ScriptedStepRunner::new()),
    )
    .run(TriggerContext::manual("acme/widgets"), &wf)
    .await
    .unwrap();

    let html = render_html_report(&record, "en").into_string();
    assert!(html.contains("&lt;script&gt;"));
    assert!(!html.contains("<script>"));
}

#[test]
fn test_status_strings_are_localized() {
    assert_eq!(status_str(JobStatus::Succeeded, "en"), "Succeeded");
    assert_eq!(status_str(JobStatus::Cancelled, "en"), "Cancelled");
    assert_eq!(status_str(JobStatus::Failed, "zh-CN"), "失败");
}
