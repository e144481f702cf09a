//! # Job Scheduler Tests / 作业调度器测试
//!
//! Checks bounded parallelism, the fail-fast policy, and crash isolation.
//!
//! 检查有界并行度、快速失败策略以及崩溃隔离。

mod common;

use common::{FakeProvider, ScriptedStepRunner, workflow};
use matrix_ci::core::cancel::CancelSignal;
use matrix_ci::core::error::{CancelReason, EnvironmentError, JobError};
use matrix_ci::core::events;
use matrix_ci::core::executor::JobExecutor;
use matrix_ci::core::job::{JobSpec, JobStatus};
use matrix_ci::core::planner::plan_execution;
use matrix_ci::core::runner::{StepInvocation, StepOutput, StepRunner};
use matrix_ci::core::error::StepError;
use matrix_ci::core::scheduler::Scheduler;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Four jobs, J1..J4, each running `job-<n>`.
fn four_jobs(fail_fast: bool) -> Vec<JobSpec> {
    let toml = format!(
        r#"
name = "matrix"
fail_fast = {fail_fast}
[matrix]
n = [1, 2, 3, 4]
[[steps]]
run = "job-${{{{ matrix.n }}}}"
"#
    );
    plan_execution(&workflow(&toml), None).unwrap().jobs
}

fn statuses(reports: &[matrix_ci::core::executor::JobReport]) -> Vec<JobStatus> {
    reports.iter().map(|r| r.status).collect()
}

#[tokio::test]
async fn test_fail_fast_cancels_pending_jobs_only() {
    let provider = Arc::new(FakeProvider::new());
    let runner = Arc::new(ScriptedStepRunner::new().exit("job-2", 1));
    let executor = Arc::new(JobExecutor::new(provider.clone(), runner.clone()));
    let scheduler = Scheduler::new(executor, 1, true);
    let (sender, _receiver) = events::channel();
    let cancel = CancelSignal::new();

    let reports = scheduler.dispatch(four_jobs(true), cancel.clone(), sender).await;

    assert_eq!(
        statuses(&reports),
        vec![
            JobStatus::Succeeded,
            JobStatus::Failed,
            JobStatus::Cancelled,
            JobStatus::Cancelled
        ]
    );
    assert_eq!(runner.commands(), vec!["job-1", "job-2"]);
    let reason = CancelReason::FailFast {
        job: "matrix (2)".to_string(),
    };
    assert_eq!(cancel.reason(), Some(reason.clone()));
    assert_eq!(reports[2].cancel_reason, Some(reason));
    // Cancelled jobs never acquired a runner; every acquired one was released.
    assert_eq!(provider.acquired(), 2);
    assert_eq!(provider.released(), 2);
}

#[tokio::test]
async fn test_without_fail_fast_every_job_runs() {
    let runner = Arc::new(ScriptedStepRunner::new().exit("job-2", 1).exit("job-3", 1));
    let executor = Arc::new(JobExecutor::new(Arc::new(FakeProvider::new()), runner.clone()));
    let scheduler = Scheduler::new(executor, 2, false);
    let (sender, _receiver) = events::channel();
    let cancel = CancelSignal::new();

    let reports = scheduler.dispatch(four_jobs(false), cancel.clone(), sender).await;

    assert_eq!(
        statuses(&reports),
        vec![
            JobStatus::Succeeded,
            JobStatus::Failed,
            JobStatus::Failed,
            JobStatus::Succeeded
        ]
    );
    assert_eq!(runner.commands().len(), 4);
    assert!(!cancel.is_cancelled());
}

#[tokio::test]
async fn test_reports_are_returned_in_job_order() {
    let runner = Arc::new(ScriptedStepRunner::new().with_delay(Duration::from_millis(5)));
    let executor = Arc::new(JobExecutor::new(Arc::new(FakeProvider::new()), runner));
    let scheduler = Scheduler::new(executor, 4, true);
    let (sender, _receiver) = events::channel();

    let reports = scheduler.dispatch(four_jobs(true), CancelSignal::new(), sender).await;

    let indices: Vec<_> = reports.iter().map(|r| r.index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3]);
}

/// Tracks how many steps run at the same time.
struct GaugeRunner {
    current: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl StepRunner for GaugeRunner {
    async fn run(&self, _invocation: StepInvocation) -> Result<StepOutput, StepError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(StepOutput {
            exit_code: Some(0),
            ..Default::default()
        })
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallelism_is_bounded() {
    let runner = Arc::new(GaugeRunner {
        current: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });
    let executor = Arc::new(JobExecutor::new(Arc::new(FakeProvider::new()), runner.clone()));
    let scheduler = Scheduler::new(executor, 2, false);
    let (sender, _receiver) = events::channel();

    let reports = scheduler.dispatch(four_jobs(false), CancelSignal::new(), sender).await;

    assert!(reports.iter().all(|r| r.status == JobStatus::Succeeded));
    let peak = runner.peak.load(Ordering::SeqCst);
    assert!(peak >= 1 && peak <= 2, "peak concurrency was {peak}");
}

/// A panicking executor task fails its job without taking down the others.
#[tokio::test]
async fn test_panicking_job_is_reported_as_failed() {
    let runner = Arc::new(ScriptedStepRunner::new().panic_on("job-3"));
    let executor = Arc::new(JobExecutor::new(Arc::new(FakeProvider::new()), runner));
    let scheduler = Scheduler::new(executor, 1, false);
    let (sender, mut receiver) = events::channel();

    let reports = scheduler.dispatch(four_jobs(false), CancelSignal::new(), sender).await;

    assert_eq!(reports[2].status, JobStatus::Failed);
    assert!(matches!(
        reports[2].error,
        Some(JobError::Environment(EnvironmentError::ExecutorCrashed { .. }))
    ));
    assert_eq!(reports[3].status, JobStatus::Succeeded);

    let mut crash_events = 0;
    while let Ok(event) = receiver.try_recv() {
        if event.job_index == 2 && event.to == JobStatus::Failed {
            crash_events += 1;
        }
    }
    assert_eq!(crash_events, 1);
}

/// A job that crashes while acquiring its runner was never seen running, so
/// its crash event goes straight from `Pending` to `Failed`.
///
/// 在获取运行器时崩溃的作业从未被观察到处于运行状态，因此其崩溃事件直接从 `Pending` 变为 `Failed`。
#[tokio::test]
async fn test_crash_before_running_starts_from_pending() {
    let wf = workflow(
        r#"
name = "matrix"
runs_on = "host-${{ matrix.n }}"
fail_fast = false
[matrix]
n = [1, 2]
[[steps]]
run = "job-${{ matrix.n }}"
"#,
    );
    let jobs = plan_execution(&wf, None).unwrap().jobs;
    let provider = Arc::new(FakeProvider::new().panic_on("host-2"));
    let executor = Arc::new(JobExecutor::new(provider.clone(), Arc::new(ScriptedStepRunner::new())));
    let scheduler = Scheduler::new(executor, 1, false);
    let (sender, mut receiver) = events::channel();

    let reports = scheduler.dispatch(jobs, CancelSignal::new(), sender).await;

    assert_eq!(reports[0].status, JobStatus::Succeeded);
    assert_eq!(reports[1].status, JobStatus::Failed);
    assert_eq!(provider.acquired(), 1);

    let mut crashed = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        if event.job_index == 1 {
            crashed.push((event.from, event.to));
        }
    }
    assert_eq!(crashed, vec![(JobStatus::Pending, JobStatus::Failed)]);
}

#[test]
fn test_default_parallelism_is_positive() {
    assert!(Scheduler::default_parallelism() >= 1);
}
