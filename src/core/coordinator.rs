//! # Run Coordinator Module / 运行协调模块
//!
//! Owns a single run end to end: expands the workflow into jobs, hands them
//! to the scheduler, forwards job events to reporting sinks, and aggregates
//! the per-job outcomes into one run status.
//!
//! 端到端地管理单次运行：将工作流展开为作业，交给调度器，
//! 将作业事件转发给报告接收器，并将各作业结果汇总为一个运行状态。

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;
use uuid::Uuid;

use crate::core::cancel::CancelSignal;
use crate::core::config::Workflow;
use crate::core::error::{CancelReason, SpecificationError};
use crate::core::events::{self, JobEvent, ReportSink};
use crate::core::executor::{JobExecutor, JobReport};
use crate::core::job::JobStatus;
use crate::core::planner::{self, ExecutionPlan, Shard};
use crate::core::runner::{RunnerProvider, StepRunner};
use crate::core::scheduler::Scheduler;
use crate::core::trigger::TriggerContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
    /// No job failed, but the run timed out or was interrupted before every
    /// job could finish.
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        self != RunStatus::Running
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Live status of a job as seen by observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSnapshot {
    pub index: usize,
    pub id: String,
    pub name: String,
    pub status: JobStatus,
}

/// Read-only view of a run, published after every job transition.
/// 运行的只读视图，在每次作业状态转换后发布。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSnapshot {
    pub run_id: Option<Uuid>,
    pub status: RunStatus,
    pub jobs: Vec<JobSnapshot>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunCounts {
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
}

/// The immutable historical record of a finished run.
/// 已完成运行的不可变历史记录。
#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    run_id: Uuid,
    workflow: String,
    trigger: TriggerContext,
    fail_fast: bool,
    status: RunStatus,
    jobs: Vec<JobReport>,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
}

impl RunRecord {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn workflow(&self) -> &str {
        &self.workflow
    }

    pub fn trigger(&self) -> &TriggerContext {
        &self.trigger
    }

    pub fn fail_fast(&self) -> bool {
        self.fail_fast
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn jobs(&self) -> &[JobReport] {
        &self.jobs
    }

    pub fn job(&self, index: usize) -> Option<&JobReport> {
        self.jobs.iter().find(|j| j.index == index)
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }

    pub fn duration(&self) -> Duration {
        (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or_default()
    }

    pub fn counts(&self) -> RunCounts {
        self.jobs
            .iter()
            .fold(RunCounts::default(), |mut counts, job| {
                match job.status {
                    JobStatus::Succeeded => counts.succeeded += 1,
                    JobStatus::Failed => counts.failed += 1,
                    JobStatus::Cancelled => counts.cancelled += 1,
                    JobStatus::Pending | JobStatus::Running => {}
                }
                counts
            })
    }
}

/// Computes the run status from terminal job reports.
///
/// `Failed` iff any job failed. Jobs cancelled by fail-fast never change the
/// result on their own; jobs cancelled by a timeout or interrupt make an
/// otherwise clean run `Cancelled`.
///
/// 根据终止的作业报告计算运行状态。
/// 当且仅当有作业失败时为 `Failed`。因快速失败而取消的作业本身不会改变结果；
/// 因超时或中断而取消的作业会使原本正常的运行变为 `Cancelled`。
pub fn aggregate_status(jobs: &[JobReport]) -> RunStatus {
    if jobs.iter().any(|j| j.status == JobStatus::Failed) {
        return RunStatus::Failed;
    }
    let externally_cancelled = jobs.iter().any(|j| {
        j.status == JobStatus::Cancelled
            && !matches!(j.cancel_reason, Some(CancelReason::FailFast { .. }))
    });
    if externally_cancelled {
        RunStatus::Cancelled
    } else {
        RunStatus::Succeeded
    }
}

/// Overrides applied on top of the workflow file, usually from the CLI.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub max_parallel: Option<usize>,
    pub timeout: Option<Duration>,
    pub shard: Option<Shard>,
}

/// Drives exactly one run. [`RunCoordinator::run`] consumes the coordinator
/// together with its cancel signal and observer channel.
///
/// 只驱动一次运行。[`RunCoordinator::run`] 会消耗协调器及其取消信号和观察者通道。
pub struct RunCoordinator {
    provider: Arc<dyn RunnerProvider>,
    step_runner: Arc<dyn StepRunner>,
    sinks: Vec<Arc<dyn ReportSink>>,
    options: RunOptions,
    cancel: CancelSignal,
    snapshot: watch::Sender<RunSnapshot>,
}

impl RunCoordinator {
    pub fn new(provider: Arc<dyn RunnerProvider>, step_runner: Arc<dyn StepRunner>) -> Self {
        let (snapshot, _) = watch::channel(RunSnapshot {
            run_id: None,
            status: RunStatus::Running,
            jobs: Vec::new(),
        });
        Self {
            provider,
            step_runner,
            sinks: Vec::new(),
            options: RunOptions::default(),
            cancel: CancelSignal::new(),
            snapshot,
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Handle used to cancel the run from outside, e.g. on Ctrl-C.
    pub fn cancel_signal(&self) -> CancelSignal {
        self.cancel.clone()
    }

    /// Observer channel for the run's live status. The last value published
    /// is the terminal one.
    ///
    /// 运行实时状态的观察者通道。最后发布的值即为终止状态。
    pub fn subscribe(&self) -> watch::Receiver<RunSnapshot> {
        self.snapshot.subscribe()
    }

    /// Runs the workflow once for `trigger`.
    ///
    /// # Errors
    /// A [`SpecificationError`] is returned before any job starts if the
    /// workflow or its matrix is malformed.
    ///
    /// 为 `trigger` 运行一次工作流。
    /// 如果工作流或其矩阵格式错误，则在任何作业开始之前返回 [`SpecificationError`]。
    pub async fn run(
        self,
        trigger: TriggerContext,
        workflow: &Workflow,
    ) -> Result<RunRecord, SpecificationError> {
        let plan = planner::plan_execution(workflow, self.options.shard)?;
        self.run_plan(trigger, workflow, plan).await
    }

    /// Like [`RunCoordinator::run`], for a plan the caller already built
    /// from `workflow`. The shard option is not applied again.
    pub async fn run_plan(
        self,
        trigger: TriggerContext,
        workflow: &Workflow,
        plan: ExecutionPlan,
    ) -> Result<RunRecord, SpecificationError> {
        let max_parallel = match self.options.max_parallel.or(workflow.max_parallel) {
            Some(0) => return Err(SpecificationError::ZeroParallelism),
            Some(n) => n,
            None => Scheduler::default_parallelism(),
        };

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(
            run = %run_id,
            workflow = %workflow.name,
            event = %trigger.event,
            jobs = plan.jobs.len(),
            max_parallel,
            fail_fast = workflow.fail_fast,
            "starting run"
        );

        self.snapshot.send_replace(RunSnapshot {
            run_id: Some(run_id),
            status: RunStatus::Running,
            jobs: plan
                .jobs
                .iter()
                .map(|job| JobSnapshot {
                    index: job.index,
                    id: job.id.clone(),
                    name: job.name.clone(),
                    status: JobStatus::Pending,
                })
                .collect(),
        });

        let executor = JobExecutor::new(Arc::clone(&self.provider), Arc::clone(&self.step_runner))
            .with_run_env(run_env(run_id, &trigger));
        let scheduler = Scheduler::new(Arc::new(executor), max_parallel, workflow.fail_fast);

        let timeout = self
            .options
            .timeout
            .or(workflow.timeout_secs.map(Duration::from_secs));
        let watchdog = timeout.map(|limit| {
            let cancel = self.cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(limit) => {
                        if cancel.cancel(CancelReason::RunTimeout { secs: limit.as_secs() }) {
                            info!("run timed out after {limit:?}, cancelling remaining jobs");
                        }
                    }
                    _ = cancel.cancelled() => {}
                }
            })
        });

        let (sender, mut receiver) = events::channel();
        let dispatch = scheduler.dispatch(plan.jobs, self.cancel.clone(), sender);
        let pump = async {
            while let Some(event) = receiver.recv().await {
                self.publish(&event);
            }
        };
        let (jobs, ()) = tokio::join!(dispatch, pump);

        if let Some(handle) = watchdog {
            handle.abort();
        }

        let status = aggregate_status(&jobs);
        let record = RunRecord {
            run_id,
            workflow: workflow.name.clone(),
            trigger,
            fail_fast: workflow.fail_fast,
            status,
            jobs,
            started_at,
            finished_at: Utc::now(),
        };

        self.snapshot.send_modify(|snapshot| snapshot.status = status);
        for sink in &self.sinks {
            sink.run_finished(&record);
        }
        Ok(record)
    }

    fn publish(&self, event: &JobEvent) {
        self.snapshot.send_modify(|snapshot| {
            if let Some(job) = snapshot.jobs.iter_mut().find(|j| j.index == event.job_index) {
                job.status = event.to;
            }
        });
        for sink in &self.sinks {
            sink.job_transition(event);
        }
    }
}

fn run_env(run_id: Uuid, trigger: &TriggerContext) -> IndexMap<String, String> {
    let mut env = IndexMap::new();
    env.insert("CI".to_string(), "true".to_string());
    env.insert("CI_RUN_ID".to_string(), run_id.to_string());
    env.insert("CI_EVENT".to_string(), trigger.event.to_string());
    env.insert("CI_REPOSITORY".to_string(), trigger.repository.clone());
    env.insert("CI_REF".to_string(), trigger.git_ref.clone());
    env.insert(
        "CI_SHA".to_string(),
        trigger.commit.clone().unwrap_or_default(),
    );
    env
}
