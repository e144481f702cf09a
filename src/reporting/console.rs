//! # Console Reporting Module / 控制台报告模块
//!
//! This module prints job transitions and the final run summary to the
//! console. It provides colourful, formatted output with internationalization
//! support.
//!
//! 此模块将作业状态转换和最终运行摘要打印到控制台。
//! 它提供彩色格式化输出，支持国际化。

use colored::*;

use crate::core::coordinator::{RunRecord, RunStatus};
use crate::core::events::{JobEvent, ReportSink};
use crate::core::executor::{JobReport, StepOutcome};
use crate::core::job::JobStatus;
use crate::infra::t;

/// Prints one line per job transition and a summary table at the end.
/// 每次作业状态转换打印一行，并在结束时打印摘要表。
#[derive(Debug, Clone)]
pub struct ConsoleSink {
    locale: String,
}

impl ConsoleSink {
    pub fn new(locale: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
        }
    }
}

impl ReportSink for ConsoleSink {
    fn job_transition(&self, event: &JobEvent) {
        let locale = self.locale.as_str();
        let line = match event.to {
            JobStatus::Running => t!(
                "run.job_started",
                locale = locale,
                name = &event.job_name,
                runner = event.detail.as_deref().unwrap_or("-")
            )
            .blue(),
            JobStatus::Succeeded => {
                t!("run.job_succeeded", locale = locale, name = &event.job_name).green()
            }
            JobStatus::Failed => t!(
                "run.job_failed",
                locale = locale,
                name = &event.job_name,
                reason = event.detail.as_deref().unwrap_or("-")
            )
            .red(),
            JobStatus::Cancelled => t!(
                "run.job_cancelled",
                locale = locale,
                name = &event.job_name,
                reason = event.detail.as_deref().unwrap_or("-")
            )
            .yellow(),
            JobStatus::Pending => return,
        };
        println!("{line}");
    }

    fn run_finished(&self, record: &RunRecord) {
        print_summary(record, &self.locale);
        let failures: Vec<&JobReport> = record.jobs().iter().filter(|j| j.is_failed()).collect();
        print_failure_details(&failures, &self.locale);
    }
}

/// Gets the status of a job as a localized string for display.
/// 以本地化字符串形式获取作业状态以供显示。
pub fn status_str(status: JobStatus, locale: &str) -> String {
    match status {
        JobStatus::Pending => t!("report.status_pending", locale = locale),
        JobStatus::Running => t!("report.status_running", locale = locale),
        JobStatus::Succeeded => t!("report.status_succeeded", locale = locale),
        JobStatus::Failed => t!("report.status_failed", locale = locale),
        JobStatus::Cancelled => t!("report.status_cancelled", locale = locale),
    }
    .to_string()
}

/// Prints a formatted summary of job results to the console.
///
/// 在控制台打印格式化的作业结果摘要。
///
/// # Output Format / 输出格式
/// ```text
/// --- Run Summary ---
///   - Succeeded  | tests (3.7, linux)                       |     1.23s
///   - Failed     | tests (3.7, mac)                         |     0.45s
///   - Cancelled  | tests (3.8, linux)                       |       N/A
/// ```
pub fn print_summary(record: &RunRecord, locale: &str) {
    println!("\n{}", t!("report.summary_banner", locale = locale).bold());

    for job in record.jobs() {
        let status = status_str(job.status, locale);
        let status_colored = match job.status {
            JobStatus::Succeeded => status.green(),
            JobStatus::Failed => status.red(),
            JobStatus::Cancelled => status.yellow(),
            JobStatus::Pending | JobStatus::Running => status.dimmed(),
        };
        let duration = if job.started_at.is_some() {
            format!("{:.2?}", job.duration)
        } else {
            "N/A".to_string()
        };

        println!(
            "  - {:<12} | {:<40} | {:>10}",
            status_colored, job.name, duration
        );
    }

    let counts = record.counts();
    let totals = t!(
        "report.totals",
        locale = locale,
        succeeded = counts.succeeded,
        failed = counts.failed,
        cancelled = counts.cancelled
    );
    let verdict = match record.status() {
        RunStatus::Succeeded => t!("report.run_succeeded", locale = locale).green().bold(),
        RunStatus::Failed => t!("report.run_failed", locale = locale).red().bold(),
        RunStatus::Cancelled => t!("report.run_cancelled", locale = locale).yellow().bold(),
        RunStatus::Running => return,
    };
    println!("\n{totals}\n{verdict}");
}

/// Prints the failing step and its captured output for each failed job.
///
/// 为每个失败的作业打印失败的步骤及其捕获的输出。
pub fn print_failure_details(failures: &[&JobReport], locale: &str) {
    if failures.is_empty() {
        return;
    }

    println!("\n{}", t!("report.failure_banner", locale = locale).red().bold());
    println!("{}", "-".repeat(80));

    for (i, job) in failures.iter().enumerate() {
        println!(
            "[{}/{}] {} '{}'",
            i + 1,
            failures.len(),
            t!("report.failure_header", locale = locale).red(),
            job.name.cyan()
        );
        if let Some(error) = &job.error {
            println!("  {error}");
        }

        for step in job.steps.iter().filter(|s| s.outcome == StepOutcome::Failed) {
            println!(
                "\n--- {} ---\n",
                t!("report.step_log", locale = locale, step = &step.name).yellow()
            );
            if !step.stdout.trim().is_empty() {
                println!("{}", step.stdout.trim_end());
            }
            if !step.stderr.trim().is_empty() {
                println!("{}", step.stderr.trim_end().red());
            }
        }
        println!("\n{}", "-".repeat(80));
    }
}
