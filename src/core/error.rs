//! # Error Taxonomy / 错误分类
//!
//! Typed errors for every failure class the orchestrator distinguishes.
//! Specification errors abort a run before any job starts; environment and
//! step errors are local to one job; cancellation is informational.
//!
//! 编排器区分的每一类失败的类型化错误。
//! 规范错误会在任何作业开始前中止运行；环境错误和步骤错误仅影响单个作业；
//! 取消只是信息性的。

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::job::JobStatus;

/// A malformed matrix or workflow definition. Fatal to the whole run.
/// 格式错误的矩阵或工作流定义。对整个运行是致命的。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecificationError {
    #[error("matrix axis '{axis}' must declare at least one value")]
    EmptyAxis { axis: String },

    #[error("matrix axis '{axis}' is declared more than once")]
    DuplicateAxis { axis: String },

    #[error("matrix {kind} entry #{index} names no axis and supplies no attributes")]
    EmptyEntry { kind: EntryKind, index: usize },

    #[error("matrix exclude entry #{index} references '{key}', which is not a declared axis")]
    UnknownExclusionKey { index: usize, key: String },

    #[error("step #{index} ('{name}') is invalid: {reason}")]
    InvalidStep {
        index: usize,
        name: String,
        reason: String,
    },

    #[error("workflow '{workflow}' declares no steps")]
    NoSteps { workflow: String },

    #[error("max_parallel must be at least 1")]
    ZeroParallelism,

    #[error("runner index {index} must be less than total runners {total}")]
    InvalidShard { index: usize, total: usize },

    #[error("artifact exclude pattern '{pattern}' is invalid: {reason}")]
    InvalidExcludePattern { pattern: String, reason: String },

    #[error("artifact lstrip paths '{first}' and '{second}' overlap; neither may be a prefix of the other")]
    OverlappingLstripPaths { first: String, second: String },
}

/// Which kind of matrix entry a [`SpecificationError`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Include,
    Exclude,
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryKind::Include => f.write_str("include"),
            EntryKind::Exclude => f.write_str("exclude"),
        }
    }
}

/// The runner target could not be acquired, provisioned or released.
/// Fails only the affected job.
///
/// 无法获取、准备或释放运行目标。仅使受影响的作业失败。
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum EnvironmentError {
    #[error("no runner available for selector '{selector}'")]
    RunnerUnavailable { selector: String },

    #[error("failed to provision runner '{selector}': {message}")]
    Provisioning { selector: String, message: String },

    #[error("failed to release runner '{label}': {message}")]
    Release { label: String, message: String },

    #[error("job executor crashed: {message}")]
    ExecutorCrashed { message: String },
}

/// A step's command returned non-zero, timed out, or the step runner faulted.
/// 步骤命令返回非零、超时，或步骤运行器出错。
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum StepError {
    #[error("step '{step}' exited with status {code}")]
    NonZeroExit { step: String, code: i32 },

    #[error("step '{step}' was terminated by a signal")]
    Terminated { step: String },

    #[error("step '{step}' timed out after {secs}s")]
    TimedOut { step: String, secs: u64 },

    #[error("step '{step}' could not run: {message}")]
    Fault { step: String, message: String },
}

/// The error that ended a job in the `Failed` state.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum JobError {
    #[error(transparent)]
    Environment(#[from] EnvironmentError),

    #[error(transparent)]
    Step(#[from] StepError),
}

/// Why a job was cancelled. Cancellation is recorded distinctly from success
/// and is not counted as a failure.
///
/// 作业被取消的原因。取消与成功分开记录，且不计为失败。
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum CancelReason {
    #[error("cancelled by fail-fast after job '{job}' failed")]
    FailFast { job: String },

    #[error("cancelled because the run timed out after {secs}s")]
    RunTimeout { secs: u64 },

    #[error("cancelled by an interrupt signal")]
    Interrupted,
}

/// An attempt to move a job along an edge the state machine does not have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid job transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: JobStatus,
    pub to: JobStatus,
}
