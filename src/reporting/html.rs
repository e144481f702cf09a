//! # HTML Reporting Module / HTML 报告模块
//!
//! This module renders a finished run as a standalone HTML page with summary
//! statistics, a job table, and the captured output of every step.
//!
//! 此模块将完成的运行渲染为独立的 HTML 页面，包含摘要统计、作业表以及每个步骤的捕获输出。

use anyhow::{Context, Result};
use maud::{DOCTYPE, Markup, html};
use std::fs;
use std::path::Path;

use crate::core::coordinator::RunRecord;
use crate::core::executor::{JobReport, StepOutcome};
use crate::core::job::JobStatus;
use crate::infra::t;
use crate::reporting::console::status_str;

const HTML_STYLE: &str = r#"
body { font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", sans-serif; margin: 2em; color: #24292f; }
table { border-collapse: collapse; width: 100%; }
th, td { border-bottom: 1px solid #d0d7de; padding: 6px 10px; text-align: left; vertical-align: top; }
.summary span { margin-right: 1.5em; font-weight: 600; }
.status-succeeded { color: #1a7f37; }
.status-failed { color: #cf222e; }
.status-cancelled { color: #9a6700; }
.status-pending, .status-running { color: #57606a; }
pre { background: #f6f8fa; padding: 8px; overflow-x: auto; max-height: 30em; }
details { margin: 4px 0; }
"#;

/// Renders the report page for `record`.
///
/// 为 `record` 渲染报告页面。
pub fn render_html_report(record: &RunRecord, locale: &str) -> Markup {
    let counts = record.counts();
    html! {
        (DOCTYPE)
        html {
            head {
                meta charset="utf-8";
                title { (t!("html_report.title", locale = locale)) }
                style { (maud::PreEscaped(HTML_STYLE)) }
            }
            body {
                h1 { (t!("html_report.main_header", locale = locale, workflow = record.workflow())) }
                p {
                    "Run " code { (record.run_id()) }
                    " · " (record.trigger().event)
                    " · " (record.started_at().format("%Y-%m-%d %H:%M:%S UTC"))
                    " · " (format!("{:.2?}", record.duration()))
                }
                div class="summary" {
                    span class={ "status-" (record.status()) } { (record.status()) }
                    span class="status-succeeded" { (counts.succeeded) " " (status_str(JobStatus::Succeeded, locale)) }
                    span class="status-failed" { (counts.failed) " " (status_str(JobStatus::Failed, locale)) }
                    span class="status-cancelled" { (counts.cancelled) " " (status_str(JobStatus::Cancelled, locale)) }
                }
                table {
                    thead {
                        tr {
                            th { (t!("html_report.col_job", locale = locale)) }
                            th { (t!("html_report.col_status", locale = locale)) }
                            th { (t!("html_report.col_runner", locale = locale)) }
                            th { (t!("html_report.col_duration", locale = locale)) }
                            th { (t!("html_report.col_steps", locale = locale)) }
                        }
                    }
                    tbody {
                        @for job in record.jobs() {
                            (job_row(job, locale))
                        }
                    }
                }
            }
        }
    }
}

fn job_row(job: &JobReport, locale: &str) -> Markup {
    html! {
        tr {
            td { (job.name) }
            td class={ "status-" (job.status) } {
                (status_str(job.status, locale))
                @if let Some(error) = &job.error {
                    br; small { (error) }
                }
                @if let Some(reason) = &job.cancel_reason {
                    br; small { (reason) }
                }
            }
            td { (job.runner.as_deref().unwrap_or(&job.runs_on)) }
            td { (format!("{:.2?}", job.duration)) }
            td {
                @for step in &job.steps {
                    details open[step.outcome == StepOutcome::Failed] {
                        summary {
                            (step.name) " - " (outcome_label(step.outcome))
                            @if step.attempts > 1 {
                                " (" (step.attempts) " attempts)"
                            }
                        }
                        @if !step.stdout.is_empty() {
                            pre { (step.stdout) }
                        }
                        @if !step.stderr.is_empty() {
                            pre { (step.stderr) }
                        }
                    }
                }
            }
        }
    }
}

fn outcome_label(outcome: StepOutcome) -> &'static str {
    match outcome {
        StepOutcome::Succeeded => "ok",
        StepOutcome::Failed => "failed",
        StepOutcome::Skipped => "skipped",
    }
}

/// Generates the HTML report and writes it to `output_path`.
///
/// # Errors
/// Returns an error if the file cannot be written.
///
/// 生成 HTML 报告并写入 `output_path`。
pub fn generate_html_report(record: &RunRecord, output_path: &Path, locale: &str) -> Result<()> {
    let markup = render_html_report(record, locale);
    fs::write(output_path, markup.into_string())
        .with_context(|| format!("Failed to write HTML report: {}", output_path.display()))
}
