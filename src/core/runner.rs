//! # Collaborator Traits / 协作者接口
//!
//! The orchestrator does not provision machines or run commands itself. It
//! consumes two external capabilities:
//!
//! - [`RunnerProvider`]: "acquire a runner matching selector S", returning a
//!   [`RunnerLease`] or an [`EnvironmentError`];
//! - [`StepRunner`]: run one command with parameters, working directory and
//!   environment, returning its exit status and duration.
//!
//! 编排器本身不准备机器也不运行命令。它依赖两个外部能力：
//! 获取匹配选择器的运行器，以及运行单个命令。
//!
//! Default local implementations live in `crate::infra`.

use async_trait::async_trait;
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::error::{EnvironmentError, StepError};
use crate::core::job::{JobSpec, StepAction};

/// Exclusive hold on a runner target for the lifetime of one job.
///
/// `release` is called on every normal exit path. Implementations must also
/// free their resources on `Drop`, which covers panics and aborted tasks.
///
/// 在一个作业的生命周期内对运行目标的独占持有。
/// 每条正常退出路径都会调用 `release`。实现还必须在 `Drop` 时释放资源，
/// 以覆盖 panic 和被中止的任务。
#[async_trait]
pub trait RunnerLease: Send {
    /// Human-readable runner label, e.g. `local:linux`.
    fn label(&self) -> &str;

    /// Directory the job's steps run in. Owned by this job only.
    fn workspace(&self) -> &Path;

    async fn release(self: Box<Self>) -> Result<(), EnvironmentError>;
}

#[async_trait]
pub trait RunnerProvider: Send + Sync {
    async fn acquire(
        &self,
        selector: &str,
        job: &JobSpec,
    ) -> Result<Box<dyn RunnerLease>, EnvironmentError>;
}

/// Everything a step runner needs to execute one attempt of a step.
/// 步骤运行器执行一次步骤尝试所需的一切。
#[derive(Debug, Clone)]
pub struct StepInvocation {
    pub step_name: String,
    pub action: StepAction,
    pub params: IndexMap<String, String>,
    pub working_dir: PathBuf,
    pub env: IndexMap<String, String>,
    pub timeout: Option<Duration>,
}

/// The result of a process that ran to completion.
#[derive(Debug, Clone, Default)]
pub struct StepOutput {
    /// `None` if the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub duration: Duration,
    pub stdout: String,
    pub stderr: String,
}

impl StepOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[async_trait]
pub trait StepRunner: Send + Sync {
    /// Runs one attempt. A non-zero exit is reported through
    /// [`StepOutput::exit_code`]; `Err` is reserved for timeouts and faults
    /// where the command could not run at all.
    async fn run(&self, invocation: StepInvocation) -> Result<StepOutput, StepError>;
}
