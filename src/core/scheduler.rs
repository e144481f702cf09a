//! # Job Scheduler Module / 作业调度模块
//!
//! Dispatches the expanded job set with bounded parallelism and applies the
//! fail-fast policy. Jobs have no data dependencies on one another, so the
//! only ordering constraint is the concurrency limit.
//!
//! 以有界并行度分派展开后的作业集，并应用快速失败策略。
//! 作业之间没有数据依赖，因此唯一的顺序约束是并发限制。

use futures::{StreamExt, stream};
use std::sync::Arc;
use tracing::{error, info};

use crate::core::cancel::CancelSignal;
use crate::core::error::CancelReason;
use crate::core::events::{EventSender, JobEvent};
use crate::core::executor::{JobExecutor, JobReport, StatusCell};
use crate::core::job::{JobSpec, JobStatus};

pub struct Scheduler {
    executor: Arc<JobExecutor>,
    max_parallel: usize,
    fail_fast: bool,
}

impl Scheduler {
    /// `max_parallel` is clamped to at least 1.
    pub fn new(executor: Arc<JobExecutor>, max_parallel: usize, fail_fast: bool) -> Self {
        Self {
            executor,
            max_parallel: max_parallel.max(1),
            fail_fast,
        }
    }

    /// The default concurrency limit when none is configured.
    pub fn default_parallelism() -> usize {
        num_cpus::get() / 2 + 1
    }

    /// Runs every job to a terminal state and returns their reports in job
    /// index order.
    ///
    /// With `fail_fast`, the first failed job fires `cancel`: jobs that have
    /// not started yet end `Cancelled` without acquiring a runner, and running
    /// jobs stop at their next step boundary.
    ///
    /// 将每个作业运行到终止状态，并按作业索引顺序返回报告。
    /// 启用 `fail_fast` 时，第一个失败的作业会触发 `cancel`：尚未开始的作业
    /// 不获取运行器直接变为 `Cancelled`，正在运行的作业在下一个步骤边界停止。
    pub async fn dispatch(
        &self,
        jobs: Vec<JobSpec>,
        cancel: CancelSignal,
        events: EventSender,
    ) -> Vec<JobReport> {
        let fail_fast = self.fail_fast;

        let mut reports: Vec<JobReport> = stream::iter(jobs.into_iter().map(|job| {
            let executor = Arc::clone(&self.executor);
            let cancel = cancel.clone();
            let events = events.clone();

            async move {
                let task_cancel = cancel.clone();
                let task_events = events.clone();
                let task_job = job.clone();
                let status = StatusCell::new();
                let task_status = status.clone();
                let handle = tokio::spawn(async move {
                    executor
                        .execute_observed(&task_job, &task_cancel, &task_events, &task_status)
                        .await
                });

                let report = match handle.await {
                    Ok(report) => report,
                    Err(e) => {
                        error!(job = %job.id, "executor task failed: {e}");
                        let report = JobReport::crashed(&job, e.to_string());
                        let from = status.get();
                        if from.can_transition_to(JobStatus::Failed) {
                            let _ = events.send(JobEvent {
                                job_index: job.index,
                                job_id: job.id.clone(),
                                job_name: job.name.clone(),
                                from,
                                to: JobStatus::Failed,
                                at: report.finished_at,
                                detail: report.error.as_ref().map(ToString::to_string),
                            });
                        }
                        report
                    }
                };

                if fail_fast
                    && report.is_failed()
                    && cancel.cancel(CancelReason::FailFast {
                        job: report.name.clone(),
                    })
                {
                    info!(job = %report.id, "fail-fast triggered, cancelling remaining jobs");
                }
                report
            }
        }))
        .buffer_unordered(self.max_parallel)
        .collect()
        .await;

        reports.sort_by_key(|r| r.index);
        reports
    }
}
