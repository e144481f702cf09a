//! # Job Execution Engine Module / 作业执行引擎模块
//!
//! Runs one job's steps, in order, on a leased runner target. Handles the
//! job state machine, per-step retries and cooperative cancellation at step
//! boundaries, and releases the runner lease on every exit path.
//!
//! 在租用的运行目标上按顺序运行一个作业的步骤。处理作业状态机、
//! 每个步骤的重试以及步骤边界处的协作式取消，并在每条退出路径上释放运行器租约。

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

use crate::core::artifacts::{ArtifactHashes, ArtifactRecorder};
use crate::core::cancel::CancelSignal;
use crate::core::error::{CancelReason, EnvironmentError, JobError, StepError};
use crate::core::events::{EventSender, JobEvent};
use crate::core::job::{JobSpec, JobStatus, Step};
use crate::core::matrix::Attributes;
use crate::core::runner::{RunnerProvider, StepInvocation, StepOutput, StepRunner};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Succeeded,
    Failed,
    /// Not started because an earlier step failed or the job was cancelled.
    Skipped,
}

/// What happened to one step of a job.
/// 作业中一个步骤的执行情况。
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub name: String,
    pub outcome: StepOutcome,
    pub error: Option<StepError>,
    pub exit_code: Option<i32>,
    /// Number of attempts made (0 for skipped steps).
    pub attempts: u8,
    pub continue_on_error: bool,
    pub duration: Duration,
    pub stdout: String,
    pub stderr: String,
    /// Workspace file hashes taken before the first attempt, for steps that
    /// record artifacts.
    /// 第一次尝试之前的工作区文件哈希（仅适用于记录工件的步骤）。
    #[serde(skip_serializing_if = "Option::is_none")]
    pub materials: Option<ArtifactHashes>,
    /// Workspace file hashes taken after the last attempt.
    /// 最后一次尝试之后的工作区文件哈希。
    #[serde(skip_serializing_if = "Option::is_none")]
    pub products: Option<ArtifactHashes>,
}

impl StepRecord {
    fn skipped(step: &Step) -> Self {
        Self {
            name: step.name.clone(),
            outcome: StepOutcome::Skipped,
            error: None,
            exit_code: None,
            attempts: 0,
            continue_on_error: step.continue_on_error,
            duration: Duration::ZERO,
            stdout: String::new(),
            stderr: String::new(),
            materials: None,
            products: None,
        }
    }

    /// A step that failed before its command could be started.
    fn faulted(step: &Step, error: StepError) -> Self {
        Self {
            outcome: StepOutcome::Failed,
            error: Some(error),
            ..Self::skipped(step)
        }
    }
}

/// The terminal result of one job.
/// 单个作业的最终结果。
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub index: usize,
    pub id: String,
    pub name: String,
    pub attributes: Attributes,
    pub runs_on: String,
    /// Label of the runner the job ran on, if one was acquired.
    pub runner: Option<String>,
    pub status: JobStatus,
    pub error: Option<JobError>,
    pub cancel_reason: Option<CancelReason>,
    pub steps: Vec<StepRecord>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: DateTime<Utc>,
    pub duration: Duration,
}

impl JobReport {
    fn new(job: &JobSpec) -> Self {
        Self {
            index: job.index,
            id: job.id.clone(),
            name: job.name.clone(),
            attributes: job.attributes.clone(),
            runs_on: job.runs_on.clone(),
            runner: None,
            status: JobStatus::Pending,
            error: None,
            cancel_reason: None,
            steps: Vec::new(),
            started_at: None,
            finished_at: Utc::now(),
            duration: Duration::ZERO,
        }
    }

    /// Report for a job whose executor task panicked. Its lease has already
    /// been released by drop. Step records are not recovered.
    pub fn crashed(job: &JobSpec, message: String) -> Self {
        let mut report = Self::new(job);
        report.status = JobStatus::Failed;
        report.error = Some(EnvironmentError::ExecutorCrashed { message }.into());
        report
    }

    pub fn is_failed(&self) -> bool {
        self.status == JobStatus::Failed
    }
}

/// The last status an executor published for its job. The scheduler reads
/// it when the executor task dies, so the crash event starts from a state
/// observers have already seen.
///
/// 执行器为其作业发布的最后一个状态。执行器任务崩溃时由调度器读取。
#[derive(Debug, Clone)]
pub struct StatusCell(Arc<Mutex<JobStatus>>);

impl StatusCell {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(JobStatus::Pending)))
    }

    pub fn get(&self) -> JobStatus {
        *self.0.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn set(&self, status: JobStatus) {
        *self.0.lock().unwrap_or_else(|p| p.into_inner()) = status;
    }
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks one job's status and emits an event for every transition.
struct Tracker<'a> {
    job: &'a JobSpec,
    events: &'a EventSender,
    status: JobStatus,
    cell: &'a StatusCell,
}

impl<'a> Tracker<'a> {
    fn advance(&mut self, next: JobStatus, detail: Option<String>) {
        match self.status.transition(next) {
            Ok(status) => {
                let event = JobEvent {
                    job_index: self.job.index,
                    job_id: self.job.id.clone(),
                    job_name: self.job.name.clone(),
                    from: self.status,
                    to: status,
                    at: Utc::now(),
                    detail,
                };
                self.status = status;
                self.cell.set(status);
                // The receiver only goes away once the run is over.
                let _ = self.events.send(event);
            }
            Err(e) => error!(job = %self.job.id, "{e}"),
        }
    }
}

enum StepsOutcome {
    Completed,
    Failed(StepError),
    Cancelled(CancelReason),
}

/// Executes jobs against a runner provider and a step runner.
///
/// 针对运行器提供者和步骤运行器执行作业。
pub struct JobExecutor {
    provider: Arc<dyn RunnerProvider>,
    step_runner: Arc<dyn StepRunner>,
    /// Run-level variables added to every step's environment.
    run_env: IndexMap<String, String>,
}

impl JobExecutor {
    pub fn new(provider: Arc<dyn RunnerProvider>, step_runner: Arc<dyn StepRunner>) -> Self {
        Self {
            provider,
            step_runner,
            run_env: IndexMap::new(),
        }
    }

    pub fn with_run_env(mut self, run_env: IndexMap<String, String>) -> Self {
        self.run_env = run_env;
        self
    }

    /// Runs `job` to a terminal state.
    ///
    /// Cancellation is honoured before the runner is acquired and before each
    /// step; a step that has already started is allowed to finish.
    ///
    /// 将 `job` 运行到终止状态。
    /// 在获取运行器之前和每个步骤之前检查取消；已开始的步骤允许完成。
    pub async fn execute(
        &self,
        job: &JobSpec,
        cancel: &CancelSignal,
        events: &EventSender,
    ) -> JobReport {
        self.execute_observed(job, cancel, events, &StatusCell::new())
            .await
    }

    /// [`JobExecutor::execute`], publishing every status the job reaches to
    /// `status`.
    pub async fn execute_observed(
        &self,
        job: &JobSpec,
        cancel: &CancelSignal,
        events: &EventSender,
        status: &StatusCell,
    ) -> JobReport {
        let mut report = JobReport::new(job);
        let mut tracker = Tracker {
            job,
            events,
            status: JobStatus::Pending,
            cell: status,
        };
        let clock = Instant::now();

        if let Some(reason) = cancel.reason() {
            tracker.advance(JobStatus::Cancelled, Some(reason.to_string()));
            report.steps = job.steps.iter().map(StepRecord::skipped).collect();
            report.cancel_reason = Some(reason);
            return finish(report, tracker.status, clock);
        }

        let lease = match self.provider.acquire(&job.runs_on, job).await {
            Ok(lease) => lease,
            Err(e) => {
                warn!(job = %job.id, selector = %job.runs_on, "{e}");
                tracker.advance(JobStatus::Failed, Some(e.to_string()));
                report.steps = job.steps.iter().map(StepRecord::skipped).collect();
                report.error = Some(e.into());
                return finish(report, tracker.status, clock);
            }
        };

        report.runner = Some(lease.label().to_string());
        report.started_at = Some(Utc::now());
        tracker.advance(JobStatus::Running, Some(lease.label().to_string()));

        let (outcome, steps) = self.run_steps(job, lease.workspace(), cancel).await;
        report.steps = steps;

        let label = lease.label().to_string();
        if let Err(e) = lease.release().await {
            warn!(job = %job.id, runner = %label, "{e}");
        }

        match outcome {
            StepsOutcome::Completed => tracker.advance(JobStatus::Succeeded, None),
            StepsOutcome::Failed(e) => {
                tracker.advance(JobStatus::Failed, Some(e.to_string()));
                report.error = Some(e.into());
            }
            StepsOutcome::Cancelled(reason) => {
                tracker.advance(JobStatus::Cancelled, Some(reason.to_string()));
                report.cancel_reason = Some(reason);
            }
        }
        finish(report, tracker.status, clock)
    }

    async fn run_steps(
        &self,
        job: &JobSpec,
        workspace: &Path,
        cancel: &CancelSignal,
    ) -> (StepsOutcome, Vec<StepRecord>) {
        let mut records = Vec::with_capacity(job.steps.len());

        for (position, step) in job.steps.iter().enumerate() {
            if let Some(reason) = cancel.reason() {
                records.extend(job.steps[position..].iter().map(StepRecord::skipped));
                return (StepsOutcome::Cancelled(reason), records);
            }

            let record = if step.record_artifacts {
                self.run_recorded_step(job, step, workspace, cancel).await
            } else {
                self.run_step(job, step, workspace, cancel).await
            };
            let failure = record.error.clone();
            records.push(record);

            if let Some(e) = failure {
                if step.continue_on_error {
                    warn!(job = %job.id, step = %step.name, "{e} (continuing)");
                    continue;
                }
                records.extend(job.steps[position + 1..].iter().map(StepRecord::skipped));
                return (StepsOutcome::Failed(e), records);
            }
        }
        (StepsOutcome::Completed, records)
    }

    /// [`JobExecutor::run_step`] wrapped in two workspace snapshots. A snapshot
    /// that cannot be taken fails the step.
    ///
    /// 在两次工作区快照之间运行步骤。无法获取快照时步骤失败。
    async fn run_recorded_step(
        &self,
        job: &JobSpec,
        step: &Step,
        workspace: &Path,
        cancel: &CancelSignal,
    ) -> StepRecord {
        let recorder = match ArtifactRecorder::new(&job.artifacts) {
            Ok(recorder) => recorder,
            Err(e) => return StepRecord::faulted(step, fault(step, e.to_string())),
        };
        let materials = match snapshot(&recorder, workspace).await {
            Ok(hashes) => hashes,
            Err(message) => return StepRecord::faulted(step, fault(step, message)),
        };
        debug!(job = %job.id, step = %step.name, files = materials.len(), "recorded materials");

        let mut record = self.run_step(job, step, workspace, cancel).await;
        record.materials = Some(materials);
        match snapshot(&recorder, workspace).await {
            Ok(products) => record.products = Some(products),
            Err(message) if record.error.is_none() => {
                record.outcome = StepOutcome::Failed;
                record.error = Some(fault(step, message));
            }
            Err(message) => warn!(job = %job.id, step = %step.name, "{message}"),
        }
        record
    }

    /// Runs one step, retrying it as configured on the step itself.
    async fn run_step(
        &self,
        job: &JobSpec,
        step: &Step,
        workspace: &Path,
        cancel: &CancelSignal,
    ) -> StepRecord {
        let max_attempts = step.retries.saturating_add(1);
        let mut backoff = Duration::from_millis(step.retry_backoff_ms);
        let started = Instant::now();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let invocation = StepInvocation {
                step_name: step.name.clone(),
                action: step.action.clone(),
                params: step.params.clone(),
                working_dir: match &step.working_directory {
                    Some(dir) => workspace.join(dir),
                    None => workspace.to_path_buf(),
                },
                env: self.step_env(job, step, workspace),
                timeout: step.timeout_secs.map(Duration::from_secs),
            };

            debug!(job = %job.id, step = %step.name, attempt, "running step");
            let (output, error) = match self.step_runner.run(invocation).await {
                Ok(output) => {
                    let error = exit_error(&step.name, &output);
                    (output, error)
                }
                Err(e) => (StepOutput::default(), Some(e)),
            };

            let done = error.is_none() || attempt >= max_attempts;
            if done {
                return StepRecord {
                    name: step.name.clone(),
                    outcome: if error.is_none() {
                        StepOutcome::Succeeded
                    } else {
                        StepOutcome::Failed
                    },
                    error,
                    exit_code: output.exit_code,
                    attempts: attempt,
                    continue_on_error: step.continue_on_error,
                    duration: started.elapsed(),
                    stdout: output.stdout,
                    stderr: output.stderr,
                    materials: None,
                    products: None,
                };
            }

            warn!(
                job = %job.id,
                step = %step.name,
                attempt,
                max_attempts,
                "step failed, retrying in {backoff:?}"
            );
            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = cancel.cancelled() => {
                    // Stop retrying; the failure stands and the next step
                    // boundary observes the cancellation.
                    return StepRecord {
                        name: step.name.clone(),
                        outcome: StepOutcome::Failed,
                        error,
                        exit_code: output.exit_code,
                        attempts: attempt,
                        continue_on_error: step.continue_on_error,
                        duration: started.elapsed(),
                        stdout: output.stdout,
                        stderr: output.stderr,
                        materials: None,
                        products: None,
                    };
                }
            }
            backoff = backoff.saturating_mul(2);
        }
    }

    /// Workflow env, then step env, then run and job variables, then one
    /// `MATRIX_<KEY>` per attribute and one `INPUT_<KEY>` per parameter.
    fn step_env(&self, job: &JobSpec, step: &Step, workspace: &Path) -> IndexMap<String, String> {
        let mut env = job.env.clone();
        env.extend(step.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        env.extend(self.run_env.iter().map(|(k, v)| (k.clone(), v.clone())));
        env.insert("CI_JOB_ID".to_string(), job.id.clone());
        env.insert("CI_JOB_NAME".to_string(), job.name.clone());
        env.insert(
            "CI_WORKSPACE".to_string(),
            workspace.to_string_lossy().into_owned(),
        );
        for (key, value) in &job.attributes {
            env.insert(format!("MATRIX_{}", env_key(key)), value.to_string());
        }
        for (key, value) in &step.params {
            env.insert(format!("INPUT_{}", env_key(key)), value.clone());
        }
        env
    }
}

fn exit_error(step: &str, output: &StepOutput) -> Option<StepError> {
    match output.exit_code {
        Some(0) => None,
        Some(code) => Some(StepError::NonZeroExit {
            step: step.to_string(),
            code,
        }),
        None => Some(StepError::Terminated {
            step: step.to_string(),
        }),
    }
}

fn fault(step: &Step, message: String) -> StepError {
    StepError::Fault {
        step: step.name.clone(),
        message,
    }
}

/// Hashes the workspace on the blocking pool.
async fn snapshot(recorder: &ArtifactRecorder, workspace: &Path) -> Result<ArtifactHashes, String> {
    let recorder = recorder.clone();
    let root = workspace.to_path_buf();
    match tokio::task::spawn_blocking(move || recorder.record(&root)).await {
        Ok(Ok(hashes)) => Ok(hashes),
        Ok(Err(e)) => Err(format!("failed to record artifacts: {e}")),
        Err(e) => Err(format!("artifact recording task failed: {e}")),
    }
}

fn env_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

fn finish(mut report: JobReport, status: JobStatus, clock: Instant) -> JobReport {
    report.status = status;
    report.finished_at = Utc::now();
    report.duration = clock.elapsed();
    report
}
